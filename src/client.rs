use std::borrow::Cow;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

use crate::constants::SDK_INFO;
use crate::crash;
use crate::dsn::Dsn;
use crate::performance::TransactionContext;
use crate::protocol::Event;
use crate::scope::Scope;
use crate::sentry_debug;
use crate::session::Session;
use crate::transport::Transport;
use crate::transports::DefaultTransportFactory;
use crate::{ClientOptions, Envelope};

/// An error refusing client construction.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The configured endpoint descriptor did not parse.
    #[error("invalid endpoint descriptor")]
    InvalidDsn(#[from] crate::dsn::ParseDsnError),
    /// The configured `sample_rate` is not a finite value in `[0, 1]`.
    #[error("sample_rate {0} is not within [0, 1]")]
    InvalidSampleRate(f32),
    /// The configured `traces_sample_rate` is not a finite value in `[0, 1]`.
    #[error("traces_sample_rate {0} is not within [0, 1]")]
    InvalidTracesSampleRate(f32),
}

fn validate_rate(rate: f32) -> bool {
    rate.is_finite() && (0.0..=1.0).contains(&rate)
}

/// The client connects a hub to a transport and drives the capture pipeline.
///
/// The client is the entry point of the delivery side: events captured on a
/// hub are enriched, sampled and framed here, then handed to the transport's
/// delivery worker. A client without a configured endpoint descriptor is
/// disabled and discards everything.
pub struct Client {
    options: ClientOptions,
    transport: RwLock<Option<Arc<dyn Transport>>>,
    signals_installed: AtomicBool,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Client")
            .field("dsn", &self.dsn())
            .field("options", &self.options)
            .finish()
    }
}

impl Client {
    /// Creates a new client from the given options.
    ///
    /// Invalid configuration refuses to construct the client. Without a
    /// `dsn` the client starts disabled.
    pub fn new(options: ClientOptions) -> Result<Client, ClientError> {
        if !validate_rate(options.sample_rate) {
            return Err(ClientError::InvalidSampleRate(options.sample_rate));
        }
        if !validate_rate(options.traces_sample_rate) {
            return Err(ClientError::InvalidTracesSampleRate(
                options.traces_sample_rate,
            ));
        }

        let transport = if options.dsn.is_some() {
            let factory = options
                .transport
                .clone()
                .unwrap_or_else(|| Arc::new(DefaultTransportFactory));
            Some(factory.create_transport(&options))
        } else {
            None
        };

        let mut signals_installed = false;
        if transport.is_some() {
            if let Err(err) = std::fs::create_dir_all(&options.cache_dir) {
                sentry_debug!("failed to create cache dir: {}", err);
            }
            if options.install_signal_handlers {
                signals_installed = crash::install(&options.cache_dir);
            }
        }

        Ok(Client {
            options,
            transport: RwLock::new(transport),
            signals_installed: AtomicBool::new(signals_installed),
        })
    }

    /// Returns the options of this client.
    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Returns the DSN that constructed this client.
    pub fn dsn(&self) -> Option<&Dsn> {
        self.options.dsn.as_ref()
    }

    /// Quick check if the client is enabled.
    pub fn is_enabled(&self) -> bool {
        self.transport
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    fn prepare_event(
        &self,
        mut event: Event<'static>,
        scope: Option<&Scope>,
    ) -> Option<Event<'static>> {
        if event.release.is_none() {
            event.release = self.options.release.clone();
        }
        if event.environment.is_none() {
            event.environment = self.options.environment.clone();
        }
        if event.server_name.is_none() {
            event.server_name = self.options.server_name.clone();
        }
        if event.sdk.is_none() {
            event.sdk = Some(Cow::Borrowed(&SDK_INFO));
        }

        if let Some(scope) = scope {
            event = scope.apply_to_event(event)?;
        }

        Some(event)
    }

    fn sample_should_send(&self) -> bool {
        let rate = self.options.sample_rate;
        if rate >= 1.0 {
            true
        } else {
            rand::random::<f32>() < rate
        }
    }

    pub(crate) fn sample_traces_should_send(&self, ctx: &TransactionContext) -> bool {
        let rate = match self.options.traces_sampler {
            Some(ref sampler) => sampler(ctx),
            None => self.options.traces_sample_rate,
        };
        if rate >= 1.0 {
            true
        } else if rate <= 0.0 || !rate.is_finite() {
            false
        } else {
            rand::random::<f32>() < rate
        }
    }

    /// Captures an event and sends it to the endpoint.
    ///
    /// If a scope is given, it is applied to the event and its event
    /// processors run. Telemetry is best-effort: every failure along the
    /// pipeline silently discards the event.
    pub fn capture_event(
        &self,
        event: Event<'static>,
        scope: Option<&Scope>,
    ) -> Option<Uuid> {
        if !self.is_enabled() {
            return None;
        }

        let mut session_update: Option<Session> = None;
        let event = match self.prepare_event(event, scope) {
            Some(event) => {
                if let Some(scope) = scope {
                    session_update = scope.update_session_from_event(&event);
                }
                Some(event)
            }
            None => {
                sentry_debug!("[capture] event dropped by event processor");
                None
            }
        };

        // sampling runs after the processors so session accounting sees
        // every event
        let event = event.and_then(|event| {
            if self.sample_should_send() {
                Some(event)
            } else {
                sentry_debug!("[capture] event sampled out");
                None
            }
        });

        let event = event.and_then(|event| match self.options.before_send {
            Some(ref callback) => {
                let event = callback(event);
                if event.is_none() {
                    sentry_debug!("[capture] event dropped by before_send");
                }
                event
            }
            None => Some(event),
        });

        let event_id = event.as_ref().map(|event| event.event_id);
        let mut envelope = Envelope::new();
        if let Some(event) = event {
            sentry_debug!("[capture] event {} accepted", event.event_id);
            envelope.add_item(event);
            if let Some(scope) = scope {
                for attachment in scope.attachments.iter() {
                    envelope.add_item(attachment.clone());
                }
            }
        }
        if let Some(session) = session_update {
            envelope.add_item(session);
        }

        if envelope.items().next().is_some() {
            self.send_envelope(envelope);
        }
        event_id
    }

    /// Sends an assembled envelope through the transport.
    pub fn send_envelope(&self, mut envelope: Envelope) {
        envelope.set_dsn(self.options.dsn.clone());
        let transport = self.transport.read().unwrap_or_else(PoisonError::into_inner);
        if let Some(ref transport) = *transport {
            transport.send_envelope(envelope);
            sentry_debug!("[capture] envelope enqueued");
        }
    }

    /// Flushes the delivery queue.
    ///
    /// This returns `true` if the queue was successfully drained in the
    /// given time, or the configured `shutdown_timeout` if none is given.
    pub fn flush(&self, timeout: Option<Duration>) -> bool {
        let transport = self.transport.read().unwrap_or_else(PoisonError::into_inner);
        match *transport {
            Some(ref transport) => {
                transport.flush(timeout.unwrap_or(self.options.shutdown_timeout))
            }
            None => true,
        }
    }

    /// Closes the client: drains the queue with a deadline, shuts the
    /// delivery worker down and releases the transport.
    ///
    /// Closing is idempotent; later captures on this client are discarded.
    pub fn close(&self, timeout: Option<Duration>) -> bool {
        let transport = self
            .transport
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let drained = match transport {
            Some(transport) => {
                transport.shutdown(timeout.unwrap_or(self.options.shutdown_timeout))
            }
            None => true,
        };
        if self.signals_installed.swap(false, Ordering::SeqCst) {
            crash::uninstall();
        }
        drained
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        if self.signals_installed.swap(false, Ordering::SeqCst) {
            crash::uninstall();
        }
    }
}

impl TryFrom<ClientOptions> for Client {
    type Error = ClientError;

    fn try_from(options: ClientOptions) -> Result<Client, ClientError> {
        Client::new(options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> ClientOptions {
        ClientOptions {
            dsn: Some("https://public@example.com/1".parse().unwrap()),
            install_signal_handlers: false,
            ..Default::default()
        }
    }

    #[test]
    fn test_invalid_sample_rates_refuse_construction() {
        for rate in [-0.1_f32, 1.1, f32::NAN, f32::INFINITY] {
            let result = Client::new(ClientOptions {
                sample_rate: rate,
                ..options()
            });
            assert!(matches!(result, Err(ClientError::InvalidSampleRate(_))));

            let result = Client::new(ClientOptions {
                traces_sample_rate: rate,
                ..options()
            });
            assert!(matches!(
                result,
                Err(ClientError::InvalidTracesSampleRate(_))
            ));
        }
    }

    #[test]
    fn test_disabled_without_dsn() {
        let client = Client::new(ClientOptions::default()).unwrap();
        assert!(!client.is_enabled());
        assert!(client.capture_event(Default::default(), None).is_none());
        assert!(client.flush(None));
    }
}
