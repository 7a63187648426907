//! This crate is the core of an error and performance telemetry SDK speaking
//! the Sentry envelope protocol.  It captures events, transactions, sessions,
//! breadcrumbs and monitor check-ins from an instrumented process and
//! delivers them to an ingestion endpoint over HTTPS.
//!
//! # Quickstart
//!
//! To use the crate you need to create a client first.  The [`init`]
//! convenience function builds a client from options, binds it to the
//! current [`Hub`] and returns a guard that flushes pending envelopes when
//! dropped.
//!
//! ```no_run
//! # fn main() -> Result<(), sentry_uplink::ClientError> {
//! let options = sentry_uplink::ClientOptions::try_from("https://key@sentry.io/42")?;
//! let _guard = sentry_uplink::init(options)?;
//! sentry_uplink::capture_message("Hello World!", sentry_uplink::Level::Info);
//! // when the guard goes out of scope the client waits up to the configured
//! // shutdown timeout to deliver the remaining envelopes.
//! # Ok(()) }
//! ```
//!
//! # Scopes, Threads and Hubs
//!
//! Data is typically bound to a [`Scope`].  Scopes are stored in a hidden
//! stack on a [`Hub`].  Once the library has been initialized a hub is
//! automatically available.  In the default config a new hub is created for
//! each thread and they act independently.
//!
//! The thread that calls [`init`] initializes the first hub which then
//! automatically becomes the base of new hubs (you can get that hub by
//! calling [`Hub::main`]).  If a new thread is spawned it gets a new hub
//! based on that one (the thread calls `Hub::new_from_top(Hub::main())`).
//! The current thread's hub is returned from [`Hub::current`].  Any hub that
//! is wrapped in an `Arc` can be temporarily bound to a thread with
//! [`Hub::run`], which restores the previous hub when it returns; together
//! with [`Hub::new_from_top`] this carries a scope snapshot across task
//! boundaries.
//!
//! # Reliability
//!
//! Delivery is best-effort by design: a bounded queue drops the oldest
//! envelope on overload, server-issued rate limits are honoured per item
//! category and capture never reports errors back into the instrumented
//! code paths.  Fatal signals are recorded through an async-signal-safe
//! crash marker that is replayed as a fatal event on the next start-up.

#![warn(missing_docs)]

#[macro_use]
mod macros;

mod api;
mod auth;
mod breadcrumbs;
mod client;
mod clientoptions;
mod constants;
pub mod crash;
mod dsn;
mod envelope;
mod error;
mod hub;
mod hub_impl;
mod init;
mod performance;
mod project_id;
pub mod protocol;
mod scope;
mod session;
pub mod test;
mod transport;
pub mod transports;
mod utils;

pub use crate::api::*;
pub use crate::auth::Auth;
pub use crate::breadcrumbs::{BreadcrumbBuffer, IntoBreadcrumbs};
pub use crate::client::{Client, ClientError};
pub use crate::clientoptions::{BeforeCallback, ClientOptions, SessionMode, TracesSampler};
pub use crate::dsn::{Dsn, ParseDsnError, Scheme};
pub use crate::envelope::{Envelope, EnvelopeItem};
pub use crate::error::{capture_error, event_from_error};
pub use crate::hub::Hub;
pub use crate::hub_impl::SwitchGuard;
pub use crate::init::{apply_defaults, init, ClientInitGuard};
pub use crate::performance::{
    start_transaction, Span, TraceHeader, TraceHeadersIter, Transaction, TransactionContext,
    TransactionOrSpan,
};
pub use crate::project_id::{ParseProjectIdError, ProjectId};
pub use crate::protocol::{Breadcrumb, Event, Level, SessionStatus, User};
pub use crate::scope::{EventProcessor, Scope, ScopeGuard};
pub use crate::session::Session;
pub use crate::transport::{Transport, TransportFactory};

pub use uuid::Uuid;
