use std::sync::{Arc, Mutex, PoisonError};

use crate::protocol::{self, Map, SpanStatus};
use crate::{Client, Hub};

const MAX_SPANS: usize = 1_000;

// global API:

/// Start a new performance monitoring transaction.
pub fn start_transaction(ctx: TransactionContext) -> Transaction {
    let client = Hub::with_active(|hub| hub.client());
    Transaction::new(client, ctx)
}

// Hub API:

impl Hub {
    /// Start a new performance monitoring transaction on this hub.
    pub fn start_transaction(&self, ctx: TransactionContext) -> Transaction {
        Transaction::new(self.client(), ctx)
    }
}

// "Context" Types:

/// The metadata a [`Transaction`] is started with.
#[derive(Debug)]
pub struct TransactionContext {
    name: String,
    op: String,
    trace_id: protocol::TraceId,
    parent_span_id: Option<protocol::SpanId>,
    sampled: Option<bool>,
    baggage: Map<String, String>,
}

impl TransactionContext {
    /// Creates a new transaction context with a fresh trace.
    #[must_use = "this must be used with `start_transaction`"]
    pub fn new(name: &str, op: &str) -> Self {
        Self::continue_from_headers(name, op, [])
    }

    /// Creates a new transaction context continuing an inbound trace.
    ///
    /// Both the `sentry-trace` and the W3C `traceparent` conventions are
    /// recognised; `baggage` entries with a `sentry-` prefix are collected
    /// opportunistically. A parent sampled flag carried by the headers
    /// overrides the local sampling decision.
    #[must_use = "this must be used with `start_transaction`"]
    pub fn continue_from_headers<'a, I: IntoIterator<Item = (&'a str, &'a str)>>(
        name: &str,
        op: &str,
        headers: I,
    ) -> Self {
        let mut trace = None;
        let mut baggage = Map::new();
        for (k, v) in headers.into_iter() {
            if k.eq_ignore_ascii_case("sentry-trace") {
                trace = parse_sentry_trace(v);
            } else if k.eq_ignore_ascii_case("traceparent") && trace.is_none() {
                trace = parse_traceparent(v);
            } else if k.eq_ignore_ascii_case("baggage") {
                baggage.extend(parse_baggage(v));
            }
        }

        let (trace_id, parent_span_id, sampled) = match trace {
            Some(trace) => (trace.trace_id, Some(trace.span_id), trace.sampled),
            None => (protocol::TraceId::default(), None, None),
        };

        Self {
            name: name.into(),
            op: op.into(),
            trace_id,
            parent_span_id,
            sampled,
            baggage,
        }
    }

    /// The name of the transaction to be started.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The operation of the transaction to be started.
    pub fn op(&self) -> &str {
        &self.op
    }

    /// The trace the transaction belongs to.
    pub fn trace_id(&self) -> protocol::TraceId {
        self.trace_id
    }

    /// The inbound sampling decision, if the trace carried one.
    pub fn sampled(&self) -> Option<bool> {
        self.sampled
    }

    /// The `sentry-`prefixed baggage entries of the inbound trace.
    pub fn baggage(&self) -> &Map<String, String> {
        &self.baggage
    }
}

// global API types:

/// A wrapper that groups a [`Transaction`] and a [`Span`] together.
#[derive(Clone, Debug)]
pub enum TransactionOrSpan {
    /// A [`Transaction`].
    Transaction(Transaction),
    /// A [`Span`].
    Span(Span),
}

impl From<Transaction> for TransactionOrSpan {
    fn from(transaction: Transaction) -> Self {
        Self::Transaction(transaction)
    }
}

impl From<Span> for TransactionOrSpan {
    fn from(span: Span) -> Self {
        Self::Span(span)
    }
}

impl TransactionOrSpan {
    /// Starts a new child span with the given `op` and `description`.
    #[must_use = "a span must be explicitly closed via `finish()`"]
    pub fn start_child(&self, op: &str, description: &str) -> Span {
        match self {
            TransactionOrSpan::Transaction(transaction) => {
                transaction.start_child(op, description)
            }
            TransactionOrSpan::Span(span) => span.start_child(op, description),
        }
    }

    /// Returns the headers needed for distributed tracing.
    pub fn iter_headers(&self) -> TraceHeadersIter {
        match self {
            TransactionOrSpan::Transaction(transaction) => transaction.iter_headers(),
            TransactionOrSpan::Span(span) => span.iter_headers(),
        }
    }

    pub(crate) fn apply_to_event(&self, event: &mut protocol::Event<'_>) {
        if event.contexts.contains_key("trace") {
            return;
        }

        let context = match self {
            TransactionOrSpan::Transaction(transaction) => transaction
                .inner
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .context
                .clone(),
            TransactionOrSpan::Span(span) => protocol::TraceContext {
                span_id: span.span.span_id,
                trace_id: span.span.trace_id,
                ..Default::default()
            },
        };
        event.contexts.insert("trace".into(), context.into());
    }
}

#[derive(Debug)]
struct TransactionInner {
    client: Option<Arc<Client>>,
    sampled: bool,
    context: protocol::TraceContext,
    transaction: Option<protocol::Transaction<'static>>,
}

type TransactionArc = Arc<Mutex<TransactionInner>>;

/// A running performance monitoring transaction.
///
/// The transaction needs to be explicitly finished via [`Transaction::finish`],
/// otherwise neither the transaction nor any of its child spans are emitted.
#[derive(Clone, Debug)]
pub struct Transaction {
    inner: TransactionArc,
}

impl Transaction {
    fn new(client: Option<Arc<Client>>, ctx: TransactionContext) -> Self {
        let (sampled, transaction) = match client.as_deref() {
            Some(client) => {
                let sampled = ctx
                    .sampled
                    .unwrap_or_else(|| client.sample_traces_should_send(&ctx));
                let transaction = sampled.then(|| protocol::Transaction {
                    name: Some(ctx.name.clone()),
                    ..Default::default()
                });
                (sampled, transaction)
            }
            None => (false, None),
        };

        let context = protocol::TraceContext {
            trace_id: ctx.trace_id,
            parent_span_id: ctx.parent_span_id,
            op: Some(ctx.op),
            ..Default::default()
        };

        Self {
            inner: Arc::new(Mutex::new(TransactionInner {
                client,
                sampled,
                context,
                transaction,
            })),
        }
    }

    /// Returns whether the transaction was sampled for sending.
    pub fn is_sampled(&self) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .sampled
    }

    /// Overrides the transaction name.
    pub fn set_name(&self, name: &str) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(transaction) = inner.transaction.as_mut() {
            transaction.name = Some(name.into());
        }
    }

    /// Sets the status of the root span.
    pub fn set_status(&self, status: SpanStatus) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.context.status = Some(status);
    }

    /// Returns the headers needed for distributed tracing.
    pub fn iter_headers(&self) -> TraceHeadersIter {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let trace = SentryTrace::new(
            inner.context.trace_id,
            inner.context.span_id,
            Some(inner.sampled),
        );
        TraceHeadersIter::new(trace.to_string())
    }

    /// Finishes the transaction and dispatches it.
    ///
    /// An unsampled transaction is discarded along with its spans.
    pub fn finish(self) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(mut transaction) = inner.transaction.take() {
            if let Some(client) = inner.client.take() {
                transaction.finish();
                if inner.context.status.is_none() {
                    inner.context.status = Some(SpanStatus::Ok);
                }
                transaction.context = inner.context.clone();

                let options = client.options();
                if transaction.release.is_none() {
                    transaction.release = options.release.clone();
                }
                if transaction.environment.is_none() {
                    transaction.environment = options.environment.clone();
                }

                let mut envelope = crate::Envelope::new();
                envelope.add_item(transaction);

                client.send_envelope(envelope)
            }
        }
    }

    /// Starts a new child span from the root span.
    #[must_use = "a span must be explicitly closed via `finish()`"]
    pub fn start_child(&self, op: &str, description: &str) -> Span {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let span = protocol::Span {
            trace_id: inner.context.trace_id,
            parent_span_id: Some(inner.context.span_id),
            op: Some(op.into()),
            description: (!description.is_empty()).then(|| description.into()),
            ..Default::default()
        };
        Span {
            transaction: Arc::clone(&self.inner),
            span,
        }
    }
}

/// A running span of a transaction.
#[derive(Clone, Debug)]
pub struct Span {
    transaction: TransactionArc,
    span: protocol::Span,
}

impl Span {
    /// Returns the headers needed for distributed tracing.
    pub fn iter_headers(&self) -> TraceHeadersIter {
        let trace = SentryTrace::new(self.span.trace_id, self.span.span_id, None);
        TraceHeadersIter::new(trace.to_string())
    }

    /// Sets the status of the span.
    pub fn set_status(&mut self, status: SpanStatus) {
        self.span.status = Some(status);
    }

    /// Finishes the span and records it on its transaction.
    ///
    /// Spans of an unsampled transaction are dropped.
    pub fn finish(mut self) {
        self.span.finish();
        let mut inner = self
            .transaction
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(transaction) = inner.transaction.as_mut() {
            if transaction.spans.len() <= MAX_SPANS {
                transaction.spans.push(self.span);
            }
        }
    }

    /// Starts a new child span from this span.
    #[must_use = "a span must be explicitly closed via `finish()`"]
    pub fn start_child(&self, op: &str, description: &str) -> Span {
        let span = protocol::Span {
            trace_id: self.span.trace_id,
            parent_span_id: Some(self.span.span_id),
            op: Some(op.into()),
            description: (!description.is_empty()).then(|| description.into()),
            ..Default::default()
        };
        Span {
            transaction: self.transaction.clone(),
            span,
        }
    }
}

/// A trace propagation header as key/value pair.
pub type TraceHeader = (&'static str, String);

/// An Iterator over the distributed tracing headers of a span.
pub struct TraceHeadersIter {
    sentry_trace: Option<String>,
}

impl TraceHeadersIter {
    pub(crate) fn new(sentry_trace: String) -> Self {
        Self {
            sentry_trace: Some(sentry_trace),
        }
    }
}

impl Iterator for TraceHeadersIter {
    type Item = TraceHeader;

    fn next(&mut self) -> Option<Self::Item> {
        self.sentry_trace.take().map(|st| ("sentry-trace", st))
    }
}

/// The continuation state of a trace: trace id, active span and sampled flag.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SentryTrace {
    pub(crate) trace_id: protocol::TraceId,
    pub(crate) span_id: protocol::SpanId,
    pub(crate) sampled: Option<bool>,
}

impl SentryTrace {
    pub(crate) fn new(
        trace_id: protocol::TraceId,
        span_id: protocol::SpanId,
        sampled: Option<bool>,
    ) -> Self {
        Self {
            trace_id,
            span_id,
            sampled,
        }
    }
}

impl Default for SentryTrace {
    fn default() -> Self {
        Self::new(Default::default(), Default::default(), None)
    }
}

impl std::fmt::Display for SentryTrace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.trace_id, self.span_id)?;
        if let Some(sampled) = self.sampled {
            write!(f, "-{}", if sampled { '1' } else { '0' })?;
        }
        Ok(())
    }
}

pub(crate) fn parse_sentry_trace(header: &str) -> Option<SentryTrace> {
    let header = header.trim();
    let mut parts = header.splitn(3, '-');

    let trace_id = parts.next()?.parse().ok()?;
    let parent_span_id = parts.next()?.parse().ok()?;
    let parent_sampled = parts.next().and_then(|sampled| match sampled {
        "1" => Some(true),
        "0" => Some(false),
        _ => None,
    });

    Some(SentryTrace::new(trace_id, parent_span_id, parent_sampled))
}

/// Parses a W3C `traceparent` header.
///
/// Version `ff` is rejected; version `00` rejects trailing data while future
/// versions accept it; all-zero trace or span identifiers are rejected.
/// Identifiers are normalised to lowercase.
pub(crate) fn parse_traceparent(header: &str) -> Option<SentryTrace> {
    let header = header.trim();
    let mut parts = header.split('-');

    let version = parts.next()?;
    if version.len() != 2 || version.eq_ignore_ascii_case("ff") {
        return None;
    }
    u8::from_str_radix(version, 16).ok()?;

    let trace_id: protocol::TraceId = parts.next()?.to_ascii_lowercase().parse().ok()?;
    let parent_span_id: protocol::SpanId = parts.next()?.to_ascii_lowercase().parse().ok()?;
    if trace_id.is_nil() || parent_span_id.is_nil() {
        return None;
    }

    let flags = parts.next()?;
    if flags.len() != 2 {
        return None;
    }
    let flags = u8::from_str_radix(flags, 16).ok()?;
    let sampled = flags & 1 == 1;

    if version == "00" && parts.next().is_some() {
        return None;
    }

    Some(SentryTrace::new(trace_id, parent_span_id, Some(sampled)))
}

/// Picks the `sentry-`prefixed entries out of a `baggage` header.
pub(crate) fn parse_baggage(header: &str) -> Map<String, String> {
    let mut entries = Map::new();
    for item in header.split(',') {
        let mut kv = item.splitn(2, '=');
        if let (Some(key), Some(value)) = (kv.next(), kv.next()) {
            let key = key.trim();
            if key.starts_with("sentry-") {
                entries.insert(key.to_owned(), value.trim().to_owned());
            }
        }
    }
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn parses_sentry_trace() {
        let trace_id = protocol::TraceId::from_str("09e04486820349518ac7b5d2adbf6ba5").unwrap();
        let parent_span_id = protocol::SpanId::from_str("9cf635fa5b870b3a").unwrap();

        let trace = parse_sentry_trace("09e04486820349518ac7b5d2adbf6ba5-9cf635fa5b870b3a-0");
        assert_eq!(
            trace,
            Some(SentryTrace::new(trace_id, parent_span_id, Some(false)))
        );

        let trace = SentryTrace::new(Default::default(), Default::default(), None);
        let parsed = parse_sentry_trace(&format!("{trace}"));
        assert_eq!(parsed, Some(trace));
    }

    #[test]
    fn parses_traceparent() {
        let trace =
            parse_traceparent("00-0123456789abcdef0123456789abcdef-89abcdef01234567-01").unwrap();
        assert_eq!(
            trace.trace_id.to_string(),
            "0123456789abcdef0123456789abcdef"
        );
        assert_eq!(trace.span_id.to_string(), "89abcdef01234567");
        assert_eq!(trace.sampled, Some(true));

        // unsampled flag bit
        let trace =
            parse_traceparent("00-0123456789abcdef0123456789abcdef-89abcdef01234567-00").unwrap();
        assert_eq!(trace.sampled, Some(false));

        // uppercase identifiers are normalised
        let trace =
            parse_traceparent("00-0123456789ABCDEF0123456789ABCDEF-89ABCDEF01234567-01").unwrap();
        assert_eq!(
            trace.trace_id.to_string(),
            "0123456789abcdef0123456789abcdef"
        );
    }

    #[test]
    fn rejects_invalid_traceparent() {
        // version ff
        assert!(
            parse_traceparent("ff-0123456789abcdef0123456789abcdef-89abcdef01234567-01").is_none()
        );
        // version 00 with trailing data
        assert!(parse_traceparent(
            "00-0123456789abcdef0123456789abcdef-89abcdef01234567-01-extra"
        )
        .is_none());
        // all-zero identifiers
        assert!(
            parse_traceparent("00-00000000000000000000000000000000-89abcdef01234567-01").is_none()
        );
        assert!(
            parse_traceparent("00-0123456789abcdef0123456789abcdef-0000000000000000-01").is_none()
        );
    }

    #[test]
    fn accepts_future_traceparent_version_with_trailing_data() {
        let trace = parse_traceparent(
            "42-0123456789abcdef0123456789abcdef-89abcdef01234567-01-future-data",
        )
        .unwrap();
        assert_eq!(trace.sampled, Some(true));
    }

    #[test]
    fn parses_sentry_baggage_entries() {
        let baggage = parse_baggage(
            "other=ignored, sentry-trace_id=09e04486820349518ac7b5d2adbf6ba5, sentry-public_key=abc",
        );
        assert_eq!(baggage.len(), 2);
        assert_eq!(
            baggage["sentry-trace_id"],
            "09e04486820349518ac7b5d2adbf6ba5"
        );
        assert_eq!(baggage["sentry-public_key"], "abc");
    }

    #[test]
    fn continues_from_traceparent_headers() {
        let ctx = TransactionContext::continue_from_headers(
            "GET /api/users",
            "http.server",
            [(
                "traceparent",
                "00-0123456789abcdef0123456789abcdef-89abcdef01234567-01",
            )],
        );
        assert_eq!(
            ctx.trace_id().to_string(),
            "0123456789abcdef0123456789abcdef"
        );
        assert_eq!(ctx.sampled(), Some(true));
    }
}
