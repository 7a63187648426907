use std::sync::Arc;
use std::time::Duration;

use crate::{ClientOptions, Envelope};

/// The trait for transports.
///
/// A transport is responsible for shipping envelopes off-process.  Because
/// of that it is necessarily a thing that can be shared between threads,
/// and all functions take `&self` instead of a mutable reference.
pub trait Transport: Send + Sync + 'static {
    /// Sends an [`Envelope`].
    ///
    /// This is fire-and-forget; delivery failures are absorbed.
    fn send_envelope(&self, envelope: Envelope);

    /// Drains the queue, waiting up to the given deadline.
    ///
    /// Returns `true` if the queue was drained before the deadline.
    fn flush(&self, timeout: Duration) -> bool {
        let _ = timeout;
        true
    }

    /// Instructs the transport to shut down, draining first.
    fn shutdown(&self, timeout: Duration) -> bool {
        self.flush(timeout)
    }
}

/// A factory creating transport instances.
///
/// Because the client is permitted to reconfigure on the fly, a transport
/// is created through a factory bound in the options rather than passed as
/// a finished instance.
pub trait TransportFactory: Send + Sync {
    /// Creates a new transport for the given options.
    fn create_transport(&self, options: &ClientOptions) -> Arc<dyn Transport>;
}

impl<T: Transport> TransportFactory for Arc<T> {
    fn create_transport(&self, options: &ClientOptions) -> Arc<dyn Transport> {
        let _ = options;
        self.clone()
    }
}
