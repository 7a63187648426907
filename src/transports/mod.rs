//! The provided transports.
//!
//! The default HTTPS transport is enabled by the `ureq` feature.  The file
//! sink and fanout transports are always available, as is the envelope
//! recorder in [`crate::test`].

use std::sync::Arc;

use crate::{ClientOptions, Transport, TransportFactory};

mod ratelimit;
pub use self::ratelimit::{RateLimiter, RateLimitingCategory};

mod thread;
pub use self::thread::TransportThread;

mod file;
pub use self::file::FileSinkTransport;

mod fanout;
pub use self::fanout::FanoutTransport;

#[cfg(feature = "ureq")]
mod ureq;
#[cfg(feature = "ureq")]
pub use self::ureq::UreqHttpTransport;

/// The default http transport.
#[cfg(feature = "ureq")]
pub type HttpTransport = UreqHttpTransport;

/// Creates the default HTTP transport.
///
/// This is the default value for `transport` on the client options.  It
/// creates an `HttpTransport`.  If no http transport was compiled into the
/// library it will panic on transport creation.
#[derive(Clone)]
pub struct DefaultTransportFactory;

impl TransportFactory for DefaultTransportFactory {
    fn create_transport(&self, options: &ClientOptions) -> Arc<dyn Transport> {
        #[cfg(feature = "ureq")]
        {
            Arc::new(HttpTransport::new(options))
        }
        #[cfg(not(feature = "ureq"))]
        {
            let _ = options;
            panic!("client was compiled without an http transport")
        }
    }
}
