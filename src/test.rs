//! This provides testing functionality for building tests.
//!
//! It provides an envelope recorder transport and helpers to capture
//! everything a block of code would have sent.
//!
//! # Example usage
//!
//! ```
//! use sentry_uplink::test::with_captured_envelopes;
//! use sentry_uplink::{capture_message, Level};
//!
//! let envelopes = with_captured_envelopes(|| {
//!     capture_message("Hello World!", Level::Warning);
//! });
//! assert_eq!(envelopes.len(), 1);
//! let event = envelopes[0].event().unwrap();
//! assert_eq!(event.message.as_deref(), Some("Hello World!"));
//! ```

use std::sync::{Arc, Mutex, PoisonError};

use once_cell::sync::Lazy;

use crate::{Client, ClientOptions, Dsn, Envelope, Hub, Transport};

static TEST_DSN: Lazy<Dsn> = Lazy::new(|| "https://public@sentry.invalid/1".parse().unwrap());

/// Collects envelopes instead of sending them.
///
/// This is the in-memory recorder backend; it implements [`Transport`] and
/// can be bound through the client options.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use sentry_uplink::test::TestTransport;
/// use sentry_uplink::{Client, ClientOptions, Hub};
///
/// let transport = TestTransport::new();
/// let options = ClientOptions {
///     dsn: Some("https://public@example.com/1".parse().unwrap()),
///     transport: Some(Arc::new(transport.clone())),
///     ..ClientOptions::default()
/// };
/// let client = Client::new(options).unwrap();
/// Hub::current().bind_client(Some(Arc::new(client)));
/// ```
pub struct TestTransport {
    collected: Mutex<Vec<Envelope>>,
}

impl TestTransport {
    /// Creates a new test transport.
    #[allow(clippy::new_ret_no_self)]
    pub fn new() -> Arc<TestTransport> {
        Arc::new(TestTransport {
            collected: Mutex::new(vec![]),
        })
    }

    /// Fetches and clears the contained envelopes.
    pub fn fetch_and_clear_envelopes(&self) -> Vec<Envelope> {
        let mut guard = self
            .collected
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        std::mem::take(&mut *guard)
    }
}

impl Transport for TestTransport {
    fn send_envelope(&self, envelope: Envelope) {
        self.collected
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(envelope);
    }
}

/// Runs some code with the default test hub and returns the captured
/// envelopes.
pub fn with_captured_envelopes<F: FnOnce()>(f: F) -> Vec<Envelope> {
    with_captured_envelopes_options(f, ClientOptions::default())
}

/// Runs some code with the default test hub with the given options and
/// returns the captured envelopes.
///
/// If no DSN is set on the options a default test DSN is inserted.  The
/// transport on the options is also overridden with a [`TestTransport`].
pub fn with_captured_envelopes_options<F: FnOnce(), O: Into<ClientOptions>>(
    f: F,
    options: O,
) -> Vec<Envelope> {
    let transport = TestTransport::new();
    let mut options = options.into();
    options.dsn = Some(options.dsn.unwrap_or_else(|| TEST_DSN.clone()));
    options.transport = Some(Arc::new(transport.clone()));
    let client = Client::new(options).expect("client options are valid");
    Hub::run(
        Arc::new(Hub::new(
            Some(Arc::new(client)),
            Arc::new(Default::default()),
        )),
        f,
    );
    transport.fetch_and_clear_envelopes()
}
