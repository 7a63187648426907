use std::time::Duration;

use ureq::{Agent, AgentBuilder, Proxy};

use super::thread::TransportThread;
use crate::dsn::Scheme;
use crate::{sentry_debug, ClientOptions, Envelope, Transport};

/// A [`Transport`] that sends envelopes via the [`ureq`] library.
///
/// This is enabled by the `ureq` feature flag.
///
/// [`ureq`]: https://crates.io/crates/ureq
pub struct UreqHttpTransport {
    thread: TransportThread,
}

impl UreqHttpTransport {
    /// Creates a new Transport.
    pub fn new(options: &ClientOptions) -> Self {
        Self::new_internal(options, None)
    }

    /// Creates a new Transport that uses the specified [`ureq::Agent`].
    pub fn with_agent(options: &ClientOptions, agent: Agent) -> Self {
        Self::new_internal(options, Some(agent))
    }

    fn new_internal(options: &ClientOptions, agent: Option<Agent>) -> Self {
        let dsn = options.dsn.as_ref().unwrap();
        let scheme = dsn.scheme();
        let agent = agent.unwrap_or_else(|| {
            let mut builder = AgentBuilder::new();

            match (scheme, &options.http_proxy, &options.https_proxy) {
                (Scheme::Https, _, &Some(ref proxy)) => {
                    if let Ok(proxy) = Proxy::new(proxy.as_ref()) {
                        builder = builder.proxy(proxy);
                    }
                }
                (_, &Some(ref proxy), _) => {
                    if let Ok(proxy) = Proxy::new(proxy.as_ref()) {
                        builder = builder.proxy(proxy);
                    }
                }
                _ => {}
            }

            builder.build()
        });
        let user_agent = options.user_agent.to_string();
        let auth = dsn.to_auth(Some(&user_agent)).to_string();
        let url = dsn.envelope_api_url();

        let thread = TransportThread::new(move |envelope: Envelope, rl| {
            let body = envelope.to_vec();
            let response = agent
                .post(&url)
                .set("Content-Type", "application/x-sentry-envelope")
                .set("User-Agent", &user_agent)
                .set("X-Sentry-Auth", &auth)
                .send_bytes(&body);

            let response = match response {
                Ok(response) => Some(response),
                // 4xx/5xx responses are not retried, but their rate-limit
                // headers still count
                Err(ureq::Error::Status(code, response)) => {
                    sentry_debug!("[worker] delivery failed with status {}", code);
                    Some(response)
                }
                Err(err) => {
                    sentry_debug!("[worker] delivery failed: {}", err);
                    None
                }
            };

            if let Some(response) = response {
                if let Some(sentry_header) = response.header("x-sentry-rate-limits") {
                    rl.update_from_sentry_header(sentry_header);
                } else if let Some(retry_after) = response.header("retry-after") {
                    rl.update_from_retry_after(retry_after);
                } else if response.status() == 429 {
                    rl.update_from_429();
                }

                match response.into_string() {
                    Err(err) => {
                        sentry_debug!("[worker] failed to read response: {}", err);
                    }
                    Ok(text) => {
                        sentry_debug!("[worker] response: `{}`", text);
                    }
                }
            }
        });
        Self { thread }
    }
}

impl Transport for UreqHttpTransport {
    fn send_envelope(&self, envelope: Envelope) {
        self.thread.send(envelope)
    }

    fn flush(&self, timeout: Duration) -> bool {
        self.thread.flush(timeout)
    }

    fn shutdown(&self, timeout: Duration) -> bool {
        self.thread.flush(timeout)
    }
}
