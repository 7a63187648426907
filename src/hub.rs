use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use uuid::Uuid;

use crate::breadcrumbs::IntoBreadcrumbs;
use crate::hub_impl::HubImpl;
use crate::protocol::{Event, Level, MonitorCheckIn, SessionStatus};
use crate::scope::{Scope, ScopeGuard};
use crate::session::Session;
use crate::Envelope;

/// The central object that manages scopes and clients.
///
/// This can be used to capture events and manage the scope.  This object is
/// internally synchronized so it can be used from multiple threads if
/// needed.  The default hub that is available automatically is thread local.
///
/// Most toplevel convenience functions dispatch to the thread-local hub
/// ([`Hub::current`]). The thread-local hub can be temporarily changed using
/// [`Hub::run`], which restores the previous hub when it returns.
pub struct Hub {
    pub(crate) inner: HubImpl,
    pub(crate) last_event_id: RwLock<Option<Uuid>>,
}

impl std::fmt::Debug for Hub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Hub")
    }
}

impl Hub {
    /// Sends the event to the current client with the current scope.
    ///
    /// In case no client is bound this does nothing and returns the nil
    /// UUID instead.
    pub fn capture_event(&self, event: Event<'static>) -> Uuid {
        let (client, scope) = self.inner.with(|stack| {
            let top = stack.top();
            (top.client.clone(), top.scope.clone())
        });
        let Some(client) = client else {
            return Uuid::nil();
        };

        let event_id = client.capture_event(event, Some(&scope));
        if let Some(event_id) = event_id {
            *self
                .last_event_id
                .write()
                .unwrap_or_else(PoisonError::into_inner) = Some(event_id);
            event_id
        } else {
            Uuid::nil()
        }
    }

    /// Captures an arbitrary message.
    pub fn capture_message(&self, msg: &str, level: Level) -> Uuid {
        let event = Event {
            message: Some(msg.to_string()),
            level,
            ..Default::default()
        };
        self.capture_event(event)
    }

    /// Captures an exception with an explicit type and value.
    pub fn capture_exception(&self, ty: &str, value: &str) -> Uuid {
        let event = Event {
            exception: vec![crate::protocol::Exception {
                ty: ty.to_string(),
                value: Some(value.to_string()),
                ..Default::default()
            }]
            .into(),
            level: Level::Error,
            ..Default::default()
        };
        self.capture_event(event)
    }

    /// Sends a monitor check-in to the current client.
    pub fn capture_check_in(&self, check_in: MonitorCheckIn) {
        if let Some(client) = self.client() {
            client.send_envelope(Envelope::from(check_in));
        }
    }

    /// Invokes a function that can modify the current scope.
    ///
    /// The function is passed a mutable reference to the [`Scope`] so that
    /// modifications can be performed.  Because there might currently not be
    /// a scope or client active it's possible that the callback might not be
    /// called at all.  As a result of this the return value of this closure
    /// must have a default that is returned in such cases.
    pub fn configure_scope<F, R>(&self, f: F) -> R
    where
        R: Default,
        F: FnOnce(&mut Scope) -> R,
    {
        let has_client = self.client().is_some();
        if !has_client {
            return Default::default();
        }
        self.with_current_scope_mut(f)
    }

    /// Pushes a new scope.
    ///
    /// This returns a guard that when dropped will pop the scope again.
    /// The lowest scope of a hub can not be popped.
    pub fn push_scope(&self) -> ScopeGuard {
        self.inner.with_mut(|stack| {
            stack.push();
            ScopeGuard(Some((self.inner.stack.clone(), stack.depth())))
        })
    }

    /// Temporarily pushes a scope for a single call optionally reconfiguring it.
    pub fn with_scope<C, F, R>(&self, scope_config: C, callback: F) -> R
    where
        C: FnOnce(&mut Scope),
        F: FnOnce() -> R,
    {
        let _guard = self.push_scope();
        self.configure_scope(scope_config);
        callback()
    }

    /// Adds a new breadcrumb to the current scope.
    ///
    /// The breadcrumb first passes the `before_breadcrumb` hook; when kept,
    /// an owned copy is stored in the scope's ring buffer, evicting the
    /// oldest breadcrumb once the configured capacity is reached.
    pub fn add_breadcrumb<B: IntoBreadcrumbs>(&self, breadcrumb: B) {
        self.inner.with_mut(|stack| {
            let top = stack.top_mut();
            if let Some(client) = top.client.clone() {
                let scope = Arc::make_mut(&mut top.scope);
                let options = client.options();
                let buffer = Arc::make_mut(&mut scope.breadcrumbs);
                buffer.set_capacity(options.max_breadcrumbs);
                for breadcrumb in breadcrumb.into_breadcrumbs() {
                    let breadcrumb_opt = match &options.before_breadcrumb {
                        Some(callback) => callback(breadcrumb),
                        None => Some(breadcrumb),
                    };
                    if let Some(breadcrumb) = breadcrumb_opt {
                        buffer.push(breadcrumb);
                    }
                }
            }
        })
    }

    /// Starts a new session for release health.
    ///
    /// A session requires a configured `release`; without one this does
    /// nothing. An already running session keeps running.
    pub fn start_session(&self) {
        self.inner.with_mut(|stack| {
            let top = stack.top_mut();
            if let Some(session) = Session::from_stack(top) {
                let scope = Arc::make_mut(&mut top.scope);
                scope.set_session(Some(session));
            }
        })
    }

    /// Ends the current session with a clean `exited` status.
    pub fn end_session(&self) {
        self.end_session_with_status(SessionStatus::Exited)
    }

    /// Ends the current session with the given status.
    pub fn end_session_with_status(&self, status: SessionStatus) {
        let (client, session) = self.inner.with_mut(|stack| {
            let top = stack.top_mut();
            let scope = Arc::make_mut(&mut top.scope);
            (top.client.clone(), scope.set_session(None))
        });
        if let (Some(client), Some(mut session)) = (client, session) {
            session.close(status);
            let mut envelope = Envelope::new();
            envelope.add_item(session);
            client.send_envelope(envelope);
        }
    }

    /// Flushes the delivery queue, waiting up to the given deadline.
    ///
    /// Returns `true` if the queue was drained before the deadline.
    pub fn flush(&self, timeout: Option<Duration>) -> bool {
        match self.client() {
            Some(client) => client.flush(timeout),
            None => true,
        }
    }

    /// Returns the last event id.
    pub fn last_event_id(&self) -> Option<Uuid> {
        *self
            .last_event_id
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
