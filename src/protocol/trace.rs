use std::borrow::Cow;
use std::convert::TryFrom;
use std::fmt;
use std::str;
use std::time::SystemTime;

use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use thiserror::Error;
use uuid::Uuid;

use crate::utils::{datetime_to_timestamp, ts_seconds_float};

/// Holds the identifier for a Span.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, Eq, PartialEq, Hash)]
#[serde(try_from = "String", into = "String")]
pub struct SpanId([u8; 8]);

impl SpanId {
    /// Returns true if the identifier is all zeroes.
    pub fn is_nil(&self) -> bool {
        self.0 == [0; 8]
    }
}

impl Default for SpanId {
    fn default() -> Self {
        let mut buf = [0; 8];

        getrandom::getrandom(&mut buf)
            .unwrap_or_else(|err| panic!("could not retrieve random bytes for SpanId: {err}"));

        Self(buf)
    }
}

impl fmt::Display for SpanId {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "{}", hex::encode(self.0))
    }
}

impl From<SpanId> for String {
    fn from(span_id: SpanId) -> Self {
        span_id.to_string()
    }
}

impl str::FromStr for SpanId {
    type Err = hex::FromHexError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let mut buf = [0; 8];
        hex::decode_to_slice(input, &mut buf)?;
        Ok(Self(buf))
    }
}

impl TryFrom<String> for SpanId {
    type Error = hex::FromHexError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Holds the identifier for a Trace.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, Eq, PartialEq, Hash)]
#[serde(try_from = "String", into = "String")]
pub struct TraceId([u8; 16]);

impl TraceId {
    /// Returns true if the identifier is all zeroes.
    pub fn is_nil(&self) -> bool {
        self.0 == [0; 16]
    }
}

impl Default for TraceId {
    fn default() -> Self {
        let mut buf = [0; 16];

        getrandom::getrandom(&mut buf)
            .unwrap_or_else(|err| panic!("could not retrieve random bytes for TraceId: {err}"));

        Self(buf)
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "{}", hex::encode(self.0))
    }
}

impl From<TraceId> for String {
    fn from(trace_id: TraceId) -> Self {
        trace_id.to_string()
    }
}

impl str::FromStr for TraceId {
    type Err = hex::FromHexError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let mut buf = [0; 16];
        hex::decode_to_slice(input, &mut buf)?;
        Ok(Self(buf))
    }
}

impl TryFrom<String> for TraceId {
    type Error = hex::FromHexError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// An error used when parsing `SpanStatus`.
#[derive(Debug, Error)]
#[error("invalid status")]
pub struct ParseStatusError;

/// The status of a Span.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum SpanStatus {
    /// The operation completed successfully.
    #[serde(rename = "ok")]
    Ok,
    /// Deadline expired before operation could complete.
    #[serde(rename = "deadline_exceeded")]
    DeadlineExceeded,
    /// 401 Unauthorized.
    #[serde(rename = "unauthenticated")]
    Unauthenticated,
    /// 403 Forbidden.
    #[serde(rename = "permission_denied")]
    PermissionDenied,
    /// 404 Not Found.
    #[serde(rename = "not_found")]
    NotFound,
    /// 429 Too Many Requests.
    #[serde(rename = "resource_exhausted")]
    ResourceExhausted,
    /// Client specified an invalid argument. 4xx.
    #[serde(rename = "invalid_argument")]
    InvalidArgument,
    /// 501 Not Implemented.
    #[serde(rename = "unimplemented")]
    Unimplemented,
    /// 503 Service Unavailable.
    #[serde(rename = "unavailable")]
    Unavailable,
    /// Other/generic 5xx.
    #[serde(rename = "internal_error")]
    InternalError,
    /// Unknown. Any non-standard HTTP status code.
    #[serde(rename = "unknown_error")]
    UnknownError,
    /// The operation was cancelled (typically by the user).
    #[serde(rename = "cancelled")]
    Cancelled,
    /// The operation was aborted, typically due to a concurrency issue.
    #[serde(rename = "aborted")]
    Aborted,
}

impl str::FromStr for SpanStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<SpanStatus, Self::Err> {
        Ok(match s {
            "ok" => SpanStatus::Ok,
            "deadline_exceeded" => SpanStatus::DeadlineExceeded,
            "unauthenticated" => SpanStatus::Unauthenticated,
            "permission_denied" => SpanStatus::PermissionDenied,
            "not_found" => SpanStatus::NotFound,
            "resource_exhausted" => SpanStatus::ResourceExhausted,
            "invalid_argument" => SpanStatus::InvalidArgument,
            "unimplemented" => SpanStatus::Unimplemented,
            "unavailable" => SpanStatus::Unavailable,
            "internal_error" => SpanStatus::InternalError,
            "unknown_error" => SpanStatus::UnknownError,
            "cancelled" => SpanStatus::Cancelled,
            "aborted" => SpanStatus::Aborted,
            _ => return Err(ParseStatusError),
        })
    }
}

impl fmt::Display for SpanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpanStatus::Ok => write!(f, "ok"),
            SpanStatus::DeadlineExceeded => write!(f, "deadline_exceeded"),
            SpanStatus::Unauthenticated => write!(f, "unauthenticated"),
            SpanStatus::PermissionDenied => write!(f, "permission_denied"),
            SpanStatus::NotFound => write!(f, "not_found"),
            SpanStatus::ResourceExhausted => write!(f, "resource_exhausted"),
            SpanStatus::InvalidArgument => write!(f, "invalid_argument"),
            SpanStatus::Unimplemented => write!(f, "unimplemented"),
            SpanStatus::Unavailable => write!(f, "unavailable"),
            SpanStatus::InternalError => write!(f, "internal_error"),
            SpanStatus::UnknownError => write!(f, "unknown_error"),
            SpanStatus::Cancelled => write!(f, "cancelled"),
            SpanStatus::Aborted => write!(f, "aborted"),
        }
    }
}

/// Holds information about a tracing event.
#[derive(Serialize, Debug, Clone, Default, PartialEq)]
pub struct TraceContext {
    /// Determines which trace the span belongs to.
    #[serde(default)]
    pub trace_id: TraceId,
    /// The ID of the span.
    #[serde(default)]
    pub span_id: SpanId,
    /// Determines the parent of this span, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_span_id: Option<SpanId>,
    /// Short code identifying the type of operation the span is measuring.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub op: Option<String>,
    /// Human readable detail description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Describes the status of the span (e.g. `ok`, `cancelled`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<SpanStatus>,
}

mod ts_seconds_float_opt {
    use super::*;
    use serde::ser;

    pub fn serialize<S>(st: &Option<SystemTime>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: ser::Serializer,
    {
        match st {
            Some(st) => ts_seconds_float::serialize(st, serializer),
            None => serializer.serialize_none(),
        }
    }
}

/// Represents a tracing span.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Span {
    /// Determines which trace the span belongs to.
    #[serde(default)]
    pub trace_id: TraceId,
    /// The ID of the span.
    #[serde(default)]
    pub span_id: SpanId,
    /// Determines the parent of this span, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_span_id: Option<SpanId>,
    /// Short code identifying the type of operation the span is measuring.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub op: Option<String>,
    /// Longer description of the span's operation, which uniquely identifies
    /// the span but is consistent across instances of the span.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// The timestamp at the measuring of the span started.
    #[serde(with = "ts_seconds_float")]
    pub start_timestamp: SystemTime,
    /// The timestamp at the measuring of the span finished.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "ts_seconds_float_opt"
    )]
    pub timestamp: Option<SystemTime>,
    /// Describes the status of the span (e.g. `ok`, `cancelled`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<SpanStatus>,
}

impl Default for Span {
    fn default() -> Self {
        Span {
            trace_id: Default::default(),
            span_id: Default::default(),
            parent_span_id: Default::default(),
            op: Default::default(),
            description: Default::default(),
            start_timestamp: SystemTime::now(),
            timestamp: Default::default(),
            status: Default::default(),
        }
    }
}

impl Span {
    /// Creates a new span with the current timestamp and random id.
    pub fn new() -> Span {
        Default::default()
    }

    /// Finalizes the span.
    pub fn finish(&mut self) {
        self.timestamp = Some(SystemTime::now());
        if self.status.is_none() {
            self.status = Some(SpanStatus::Ok);
        }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "Span(id: {}, ts: {})",
            self.span_id,
            crate::utils::to_rfc3339(&self.start_timestamp)
        )
    }
}

/// Represents a tracing transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct Transaction<'a> {
    /// The ID of the transaction event.
    pub event_id: Uuid,
    /// The transaction name.
    pub name: Option<String>,
    /// A release identifier.
    pub release: Option<Cow<'a, str>>,
    /// An optional environment identifier.
    pub environment: Option<Cow<'a, str>>,
    /// The start time of the transaction.
    pub start_timestamp: SystemTime,
    /// The end time of the transaction.
    pub timestamp: Option<SystemTime>,
    /// The trace context of the root span.
    pub context: TraceContext,
    /// The collection of finished spans part of this transaction.
    pub spans: Vec<Span>,
}

impl<'a> Default for Transaction<'a> {
    fn default() -> Self {
        Transaction {
            event_id: Uuid::new_v4(),
            name: Default::default(),
            release: Default::default(),
            environment: Default::default(),
            start_timestamp: SystemTime::now(),
            timestamp: Default::default(),
            context: Default::default(),
            spans: Default::default(),
        }
    }
}

impl<'a> Transaction<'a> {
    /// Creates a new transaction with the current timestamp and random ids.
    pub fn new() -> Transaction<'a> {
        Default::default()
    }

    /// Creates a fully owned version of the transaction.
    pub fn into_owned(self) -> Transaction<'static> {
        Transaction {
            event_id: self.event_id,
            name: self.name,
            release: self.release.map(|x| Cow::Owned(x.into_owned())),
            environment: self.environment.map(|x| Cow::Owned(x.into_owned())),
            start_timestamp: self.start_timestamp,
            timestamp: self.timestamp,
            context: self.context,
            spans: self.spans,
        }
    }

    /// Finalizes the transaction to be dispatched.
    pub fn finish(&mut self) {
        self.timestamp = Some(SystemTime::now());
        if self.context.status.is_none() {
            self.context.status = Some(SpanStatus::Ok);
        }
    }
}

impl<'a> fmt::Display for Transaction<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "Transaction(id: {}, ts: {})",
            self.event_id,
            crate::utils::to_rfc3339(&self.start_timestamp)
        )
    }
}

impl<'a> Serialize for Transaction<'a> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct Contexts<'a> {
            trace: &'a TraceContext,
        }

        let mut state = serializer.serialize_struct("Transaction", 9)?;
        state.serialize_field("type", "transaction")?;
        match self.name {
            Some(ref name) => state.serialize_field("transaction", name)?,
            None => state.skip_field("transaction")?,
        }
        state.serialize_field(
            "start_timestamp",
            &datetime_to_timestamp(&self.start_timestamp),
        )?;
        match self.timestamp {
            Some(ref ts) => state.serialize_field("timestamp", &datetime_to_timestamp(ts))?,
            None => state.skip_field("timestamp")?,
        }
        state.serialize_field("contexts", &Contexts { trace: &self.context })?;
        state.serialize_field("spans", &self.spans)?;
        state.serialize_field("platform", "other")?;
        match self.release {
            Some(ref release) => state.serialize_field("release", release)?,
            None => state.skip_field("release")?,
        }
        match self.environment {
            Some(ref environment) => state.serialize_field("environment", environment)?,
            None => state.skip_field("environment")?,
        }
        state.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_trace_id_hex_roundtrip() {
        let trace_id = TraceId::default();
        let hex32 = trace_id.to_string();
        assert_eq!(hex32.len(), 32);
        assert_eq!(hex32.parse::<TraceId>().unwrap(), trace_id);

        let span_id = SpanId::default();
        let hex16 = span_id.to_string();
        assert_eq!(hex16.len(), 16);
        assert_eq!(hex16.parse::<SpanId>().unwrap(), span_id);
    }

    #[test]
    fn test_trace_id_parse_rejects_bad_lengths() {
        assert!("abcd".parse::<TraceId>().is_err());
        assert!("xx".repeat(8).parse::<SpanId>().is_err());
    }

    #[test]
    fn test_transaction_encoding() {
        let start = SystemTime::UNIX_EPOCH + Duration::from_millis(1_595_256_674_296);
        let end = start + Duration::from_millis(704);
        let trace_id: TraceId = "335e53d614474acc9f89e632b776cc28".parse().unwrap();
        let span_id: SpanId = "d42cee9fc3e74f5c".parse().unwrap();
        let child_id: SpanId = "c0ffeec0ffeec0ff".parse().unwrap();

        let transaction = Transaction {
            name: Some("GET /api/users".into()),
            release: Some("app@1.0".into()),
            start_timestamp: start,
            timestamp: Some(end),
            context: TraceContext {
                trace_id,
                span_id,
                op: Some("http.server".into()),
                status: Some(SpanStatus::Ok),
                ..Default::default()
            },
            spans: vec![Span {
                trace_id,
                span_id: child_id,
                parent_span_id: Some(span_id),
                op: Some("db.query".into()),
                start_timestamp: start,
                timestamp: Some(end),
                status: Some(SpanStatus::Ok),
                ..Default::default()
            }],
            ..Default::default()
        };

        assert_eq!(
            serde_json::to_string(&transaction).unwrap(),
            r#"{"type":"transaction","transaction":"GET /api/users","start_timestamp":1595256674.296,"timestamp":1595256675.0,"contexts":{"trace":{"trace_id":"335e53d614474acc9f89e632b776cc28","span_id":"d42cee9fc3e74f5c","op":"http.server","status":"ok"}},"spans":[{"trace_id":"335e53d614474acc9f89e632b776cc28","span_id":"c0ffeec0ffeec0ff","parent_span_id":"d42cee9fc3e74f5c","op":"db.query","start_timestamp":1595256674.296,"timestamp":1595256675,"status":"ok"}],"platform":"other","release":"app@1.0"}"#
        );
    }
}
