use std::sync::Arc;
use std::time::Duration;

use crate::{Envelope, Transport};

/// A [`Transport`] that broadcasts every envelope to a set of inner
/// transports.
///
/// Each inner transport keeps its own delivery worker and rate-limit
/// ledger, so a server-issued block on one backend leaves the others
/// unaffected and the effective block is the longest expiry.
pub struct FanoutTransport {
    inner: Vec<Arc<dyn Transport>>,
}

impl FanoutTransport {
    /// Creates a new fanout over the given transports.
    pub fn new(inner: Vec<Arc<dyn Transport>>) -> Self {
        Self { inner }
    }
}

impl Transport for FanoutTransport {
    fn send_envelope(&self, envelope: Envelope) {
        if let Some((last, rest)) = self.inner.split_last() {
            for transport in rest {
                transport.send_envelope(envelope.clone());
            }
            last.send_envelope(envelope);
        }
    }

    fn flush(&self, timeout: Duration) -> bool {
        self.inner.iter().fold(true, |drained, transport| {
            transport.flush(timeout) && drained
        })
    }

    fn shutdown(&self, timeout: Duration) -> bool {
        self.inner.iter().fold(true, |drained, transport| {
            transport.shutdown(timeout) && drained
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::TestTransport;

    #[test]
    fn test_broadcasts_to_all_backends() {
        let first = TestTransport::new();
        let second = TestTransport::new();
        let fanout =
            FanoutTransport::new(vec![first.clone() as Arc<dyn Transport>, second.clone()]);

        let mut envelope = Envelope::new();
        envelope.add_item(crate::protocol::Event::default());
        fanout.send_envelope(envelope);

        assert_eq!(first.fetch_and_clear_envelopes().len(), 1);
        assert_eq!(second.fetch_and_clear_envelopes().len(), 1);
        assert!(fanout.flush(Duration::from_millis(10)));
    }
}
