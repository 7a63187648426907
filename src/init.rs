use std::borrow::Cow;
use std::env;
use std::sync::Arc;

use crate::client::ClientError;
use crate::clientoptions::SessionMode;
use crate::dsn::Dsn;
use crate::{crash, sentry_debug, Client, ClientOptions, Hub};

/// Helper struct that is returned from [`init`].
///
/// When this is dropped any open session is ended, the send queue is
/// flushed with the configured `shutdown_timeout` and the transport is
/// shut down.
#[must_use = "when the init guard is dropped the send queue is flushed and the \
              transport will be shut down and no further events can be sent."]
pub struct ClientInitGuard(Arc<Client>);

impl std::ops::Deref for ClientInitGuard {
    type Target = Client;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl ClientInitGuard {
    /// Quick check if the client is enabled.
    pub fn is_enabled(&self) -> bool {
        self.0.is_enabled()
    }
}

impl Drop for ClientInitGuard {
    fn drop(&mut self) {
        if self.is_enabled() {
            sentry_debug!("dropping client guard -> disposing client");
        } else {
            sentry_debug!("dropping client guard (no client to dispose)");
        }
        // end any session that might be open before closing the client
        crate::end_session();
        self.0.close(None);
    }
}

/// Applies the environment fallbacks to the given options.
pub fn apply_defaults(mut opts: ClientOptions) -> ClientOptions {
    if opts.dsn.is_none() {
        opts.dsn = env::var("SENTRY_DSN")
            .ok()
            .and_then(|dsn| dsn.parse::<Dsn>().ok());
    }
    if opts.release.is_none() {
        opts.release = env::var("SENTRY_RELEASE").ok().map(Cow::Owned);
    }
    if opts.environment.is_none() {
        opts.environment = env::var("SENTRY_ENVIRONMENT")
            .ok()
            .map(Cow::Owned)
            .or(Some(Cow::Borrowed("production")));
    }
    if opts.http_proxy.is_none() {
        opts.http_proxy = env::var("HTTP_PROXY")
            .ok()
            .map(Cow::Owned)
            .or_else(|| env::var("http_proxy").ok().map(Cow::Owned));
    }
    if opts.https_proxy.is_none() {
        opts.https_proxy = env::var("HTTPS_PROXY")
            .ok()
            .map(Cow::Owned)
            .or_else(|| env::var("https_proxy").ok().map(Cow::Owned))
            .or_else(|| opts.http_proxy.clone());
    }
    opts
}

/// Creates the client for the given options and binds it to the current hub.
///
/// This returns a [`ClientInitGuard`] that must be kept in scope: when it is
/// dropped, pending envelopes are flushed and the transport shuts down. A
/// previously recorded crash marker is replayed as a fatal event, and a
/// session is started when `auto_session_tracking` is enabled.
///
/// Configuration errors (a malformed descriptor, sample rates outside
/// `[0, 1]`) refuse to construct the client.
///
/// # Examples
///
/// ```no_run
/// # fn main() -> Result<(), sentry_uplink::ClientError> {
/// let options = sentry_uplink::ClientOptions::try_from("https://key@sentry.io/42")?;
/// let _guard = sentry_uplink::init(options)?;
/// # Ok(()) }
/// ```
pub fn init<C>(opts: C) -> Result<ClientInitGuard, ClientError>
where
    C: Into<ClientOptions>,
{
    let opts = apply_defaults(opts.into());

    let auto_session_tracking = opts.auto_session_tracking;
    let session_mode = opts.session_mode;
    let cache_dir = opts.cache_dir.clone();

    let client = Arc::new(Client::new(opts)?);

    Hub::with(|hub| hub.bind_client(Some(client.clone())));
    if let Some(dsn) = client.dsn() {
        sentry_debug!("enabled client for DSN {}", dsn);
    } else {
        sentry_debug!("initialized disabled client due to missing DSN");
    }

    if client.is_enabled() {
        if let Some(event) = crash::replay(&cache_dir) {
            Hub::with(|hub| hub.capture_event(event));
        }
        if auto_session_tracking && session_mode == SessionMode::Application {
            crate::start_session();
        }
    }

    Ok(ClientInitGuard(client))
}
