use std::borrow::Cow;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::breadcrumbs::DEFAULT_BREADCRUMBS;
use crate::constants::USER_AGENT;
use crate::dsn::Dsn;
use crate::performance::TransactionContext;
use crate::protocol::{Breadcrumb, Event};
use crate::transport::TransportFactory;

/// Type alias for before event/breadcrumb handlers.
pub type BeforeCallback<T> = Arc<dyn Fn(T) -> Option<T> + Send + Sync>;

/// Type alias for the per-transaction sampler callback.
pub type TracesSampler = dyn Fn(&TransactionContext) -> f32 + Send + Sync;

/// How sessions are tracked and reported.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SessionMode {
    /// One session per application run; a `duration` is reported on end.
    Application,
    /// Short-lived request sessions without a `duration`.
    Request,
}

/// Configuration settings for the client.
#[derive(Clone)]
pub struct ClientOptions {
    /// The endpoint descriptor to connect to.
    pub dsn: Option<Dsn>,
    /// Enables line-level diagnostics of the capture pipeline on stderr.
    pub debug: bool,
    /// The release to be sent with events.
    pub release: Option<Cow<'static, str>>,
    /// The environment to be sent with events.
    pub environment: Option<Cow<'static, str>>,
    /// The server name to be reported.
    pub server_name: Option<Cow<'static, str>>,
    /// The sample rate for event submission. (0.0 - 1.0, defaults to 1.0)
    pub sample_rate: f32,
    /// The sample rate for tracing transactions. (0.0 - 1.0, defaults to 0.0)
    pub traces_sample_rate: f32,
    /// A callback deciding the sample rate per transaction.
    ///
    /// Overrides `traces_sample_rate`; an inbound parent sampling decision
    /// still takes precedence over both.
    pub traces_sampler: Option<Arc<TracesSampler>>,
    /// Maximum number of breadcrumbs a scope holds. (defaults to 100,
    /// clamped to 200)
    pub max_breadcrumbs: usize,
    /// Callback that is executed before an event is sent; returning `None`
    /// drops the event.
    pub before_send: Option<BeforeCallback<Event<'static>>>,
    /// Callback that is executed for each breadcrumb being added; returning
    /// `None` discards the breadcrumb.
    pub before_breadcrumb: Option<BeforeCallback<Breadcrumb>>,
    /// The transport to use.
    ///
    /// This is typically a factory for the default HTTPS transport, but may
    /// be swapped for a recorder, file sink or fanout.
    pub transport: Option<Arc<dyn TransportFactory>>,
    /// The user agent reported to the ingestion endpoint.
    pub user_agent: Cow<'static, str>,
    /// An optional HTTP proxy to use.
    pub http_proxy: Option<Cow<'static, str>>,
    /// An optional HTTPS proxy to use.
    pub https_proxy: Option<Cow<'static, str>>,
    /// The directory the crash marker is kept in.
    pub cache_dir: PathBuf,
    /// Whether the crash-signal handler is installed.
    pub install_signal_handlers: bool,
    /// Automatically starts a session at init and ends it on shutdown.
    pub auto_session_tracking: bool,
    /// Determines how sessions are reported.
    pub session_mode: SessionMode,
    /// The deadline for the teardown flush.
    pub shutdown_timeout: Duration,
}

impl Default for ClientOptions {
    fn default() -> ClientOptions {
        ClientOptions {
            dsn: None,
            debug: false,
            release: None,
            environment: None,
            server_name: None,
            sample_rate: 1.0,
            traces_sample_rate: 0.0,
            traces_sampler: None,
            max_breadcrumbs: DEFAULT_BREADCRUMBS,
            before_send: None,
            before_breadcrumb: None,
            transport: None,
            user_agent: Cow::Borrowed(USER_AGENT),
            http_proxy: None,
            https_proxy: None,
            cache_dir: PathBuf::from("."),
            install_signal_handlers: true,
            auto_session_tracking: false,
            session_mode: SessionMode::Application,
            shutdown_timeout: Duration::from_secs(2),
        }
    }
}

impl fmt::Debug for ClientOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        #[derive(Debug)]
        struct BeforeSendSet(bool);
        #[derive(Debug)]
        struct BeforeBreadcrumbSet(bool);
        #[derive(Debug)]
        struct TracesSamplerSet(bool);
        #[derive(Debug)]
        struct TransportSet(bool);

        f.debug_struct("ClientOptions")
            .field("dsn", &self.dsn)
            .field("debug", &self.debug)
            .field("release", &self.release)
            .field("environment", &self.environment)
            .field("server_name", &self.server_name)
            .field("sample_rate", &self.sample_rate)
            .field("traces_sample_rate", &self.traces_sample_rate)
            .field(
                "traces_sampler",
                &TracesSamplerSet(self.traces_sampler.is_some()),
            )
            .field("max_breadcrumbs", &self.max_breadcrumbs)
            .field("before_send", &BeforeSendSet(self.before_send.is_some()))
            .field(
                "before_breadcrumb",
                &BeforeBreadcrumbSet(self.before_breadcrumb.is_some()),
            )
            .field("transport", &TransportSet(self.transport.is_some()))
            .field("user_agent", &self.user_agent)
            .field("http_proxy", &self.http_proxy)
            .field("https_proxy", &self.https_proxy)
            .field("cache_dir", &self.cache_dir)
            .field("install_signal_handlers", &self.install_signal_handlers)
            .field("auto_session_tracking", &self.auto_session_tracking)
            .field("session_mode", &self.session_mode)
            .field("shutdown_timeout", &self.shutdown_timeout)
            .finish()
    }
}

impl TryFrom<&str> for ClientOptions {
    type Error = crate::dsn::ParseDsnError;

    fn try_from(dsn: &str) -> Result<ClientOptions, Self::Error> {
        let dsn = if dsn.is_empty() {
            None
        } else {
            Some(dsn.parse()?)
        };
        Ok(ClientOptions {
            dsn,
            ..Default::default()
        })
    }
}

impl From<Dsn> for ClientOptions {
    fn from(dsn: Dsn) -> ClientOptions {
        ClientOptions {
            dsn: Some(dsn),
            ..Default::default()
        }
    }
}
