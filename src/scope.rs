use std::borrow::Cow;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use crate::breadcrumbs::BreadcrumbBuffer;
use crate::performance::{SentryTrace, TraceHeader, TraceHeadersIter, TransactionOrSpan};
use crate::protocol::{Attachment, Context, Event, Level, TraceContext, User, Value};
use crate::session::{Session, SessionUpdate};
use crate::Client;

#[derive(Debug)]
pub struct Stack {
    top: StackLayer,
    layers: Vec<StackLayer>,
}

/// A scope-registered hook running over every captured event.
pub type EventProcessor = Arc<dyn Fn(Event<'static>) -> Option<Event<'static>> + Send + Sync>;

/// Holds contextual data for the current scope.
///
/// The scope is an object that can be cloned efficiently and stores data that
/// is locally relevant to an event.  For instance the scope will hold recorded
/// breadcrumbs and similar information.
///
/// The scope can be interacted with in two ways:
///
/// 1. the scope is routinely updated with information by functions such as
///    [`add_breadcrumb`] which will modify the currently top-most scope.
/// 2. the topmost scope can also be configured through the [`configure_scope`]
///    method.
///
/// [`add_breadcrumb`]: crate::add_breadcrumb
/// [`configure_scope`]: crate::configure_scope
#[derive(Clone, Default)]
pub struct Scope {
    pub(crate) level: Option<Level>,
    pub(crate) fingerprint: Option<Arc<[Cow<'static, str>]>>,
    pub(crate) transaction: Option<Arc<str>>,
    pub(crate) breadcrumbs: Arc<BreadcrumbBuffer>,
    pub(crate) user: Option<Arc<User>>,
    pub(crate) extra: Arc<crate::protocol::Map<String, Value>>,
    pub(crate) tags: Arc<crate::protocol::Map<String, String>>,
    pub(crate) contexts: Arc<crate::protocol::Map<String, Context>>,
    pub(crate) event_processors: Arc<Vec<EventProcessor>>,
    pub(crate) session: Arc<Mutex<Option<Session>>>,
    pub(crate) span: Arc<Option<TransactionOrSpan>>,
    pub(crate) attachments: Arc<Vec<Attachment>>,
    pub(crate) propagation_context: SentryTrace,
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("level", &self.level)
            .field("fingerprint", &self.fingerprint)
            .field("transaction", &self.transaction)
            .field("breadcrumbs", &self.breadcrumbs.len())
            .field("user", &self.user)
            .field("extra", &self.extra)
            .field("tags", &self.tags)
            .field("contexts", &self.contexts)
            .field("event_processors", &self.event_processors.len())
            .field("span", &self.span)
            .field("attachments", &self.attachments.len())
            .field("propagation_context", &self.propagation_context)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct StackLayer {
    pub client: Option<Arc<Client>>,
    pub scope: Arc<Scope>,
}

impl Stack {
    pub fn from_client_and_scope(client: Option<Arc<Client>>, scope: Arc<Scope>) -> Stack {
        Stack {
            top: StackLayer { client, scope },
            layers: vec![],
        }
    }

    pub fn push(&mut self) {
        let layer = self.top.clone();
        self.layers.push(layer);
    }

    pub fn pop(&mut self) {
        if self.layers.is_empty() {
            panic!("Pop from empty stack");
        }
        self.top = self.layers.pop().unwrap();
    }

    #[inline(always)]
    pub fn top(&self) -> &StackLayer {
        &self.top
    }

    #[inline(always)]
    pub fn top_mut(&mut self) -> &mut StackLayer {
        &mut self.top
    }

    pub fn depth(&self) -> usize {
        self.layers.len()
    }
}

/// A scope guard.
///
/// This is returned from [`Hub::push_scope`] and will automatically pop the
/// scope on drop.
///
/// [`Hub::push_scope`]: crate::Hub::push_scope
#[derive(Default)]
pub struct ScopeGuard(pub(crate) Option<(Arc<RwLock<Stack>>, usize)>);

impl fmt::Debug for ScopeGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ScopeGuard")
    }
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        if let Some((stack, depth)) = self.0.take() {
            let popped_depth = {
                let mut stack = stack.write().unwrap_or_else(PoisonError::into_inner);
                let popped_depth = stack.depth();
                stack.pop();
                popped_depth
            };
            // The lock must be released before panicking, as a panic hook may
            // want to capture through the same stack.
            if popped_depth != depth {
                panic!("Popped scope guard out of order");
            }
        }
    }
}

impl Scope {
    /// Clear the scope.
    ///
    /// By default a scope will inherit all values from the higher scope.
    /// In some situations this might not be what a user wants.  Calling
    /// this method will wipe all data contained within.
    pub fn clear(&mut self) {
        *self = Default::default();
    }

    /// Deletes current breadcrumbs from the scope.
    pub fn clear_breadcrumbs(&mut self) {
        Arc::make_mut(&mut self.breadcrumbs).clear();
    }

    /// Sets a level override.
    pub fn set_level(&mut self, level: Option<Level>) {
        self.level = level;
    }

    /// Sets the fingerprint.
    pub fn set_fingerprint(&mut self, fingerprint: Option<&[&str]>) {
        self.fingerprint =
            fingerprint.map(|fp| fp.iter().map(|s| Cow::Owned((*s).into())).collect())
    }

    /// Sets the transaction name override.
    pub fn set_transaction(&mut self, transaction: Option<&str>) {
        self.transaction = transaction.map(Arc::from);
        if let Some(name) = transaction {
            if let Some(TransactionOrSpan::Transaction(trx)) = self.span.as_ref() {
                trx.set_name(name);
            }
        }
    }

    /// Sets the user for the current scope.
    pub fn set_user(&mut self, user: Option<User>) {
        self.user = user.map(Arc::new);
    }

    /// Retrieves the user of the current scope.
    pub fn user(&self) -> Option<&User> {
        self.user.as_deref()
    }

    /// Sets a tag to a specific value.
    pub fn set_tag<V: ToString>(&mut self, key: &str, value: V) {
        Arc::make_mut(&mut self.tags).insert(key.to_string(), value.to_string());
    }

    /// Removes a tag.
    ///
    /// If the tag is not set, does nothing.
    pub fn remove_tag(&mut self, key: &str) {
        Arc::make_mut(&mut self.tags).remove(key);
    }

    /// Sets a context for a key.
    pub fn set_context<C: Into<Context>>(&mut self, key: &str, value: C) {
        Arc::make_mut(&mut self.contexts).insert(key.to_string(), value.into());
    }

    /// Removes a context for a key.
    pub fn remove_context(&mut self, key: &str) {
        Arc::make_mut(&mut self.contexts).remove(key);
    }

    /// Sets an extra to a specific value.
    pub fn set_extra(&mut self, key: &str, value: Value) {
        Arc::make_mut(&mut self.extra).insert(key.to_string(), value);
    }

    /// Removes an extra.
    pub fn remove_extra(&mut self, key: &str) {
        Arc::make_mut(&mut self.extra).remove(key);
    }

    /// Add an event processor to the scope.
    ///
    /// A processor receives the event by value and may mutate it or drop it
    /// entirely by returning `None`. Processors run in insertion order after
    /// the scope's own data is applied and before the before-send hook.
    pub fn add_event_processor<F>(&mut self, f: F)
    where
        F: Fn(Event<'static>) -> Option<Event<'static>> + Send + Sync + 'static,
    {
        Arc::make_mut(&mut self.event_processors).push(Arc::new(f));
    }

    /// Adds an attachment to the scope.
    pub fn add_attachment(&mut self, attachment: Attachment) {
        Arc::make_mut(&mut self.attachments).push(attachment);
    }

    /// Clears attachments from the scope.
    pub fn clear_attachments(&mut self) {
        Arc::make_mut(&mut self.attachments).clear();
    }

    /// Applies the contained scoped data to fill an event.
    ///
    /// The scope's own memory is untouched; every applied value is an
    /// event-owned copy. Returns `None` when an event processor drops the
    /// event.
    pub fn apply_to_event(&self, mut event: Event<'static>) -> Option<Event<'static>> {
        if let Some(level) = self.level {
            event.level = level;
        }

        if event.user.is_none() {
            if let Some(user) = self.user.as_deref() {
                event.user = Some(user.clone());
            }
        }

        event.breadcrumbs.extend(self.breadcrumbs.snapshot());
        event
            .extra
            .extend(self.extra.iter().map(|(k, v)| (k.to_owned(), v.to_owned())));
        event
            .tags
            .extend(self.tags.iter().map(|(k, v)| (k.to_owned(), v.to_owned())));
        event.contexts.extend(
            self.contexts
                .iter()
                .map(|(k, v)| (k.to_owned(), v.to_owned())),
        );

        if let Some(span) = self.span.as_ref() {
            span.apply_to_event(&mut event);
        } else {
            self.apply_propagation_context(&mut event);
        }

        if event.transaction.is_none() {
            if let Some(txn) = self.transaction.as_deref() {
                event.transaction = Some(txn.to_owned());
            }
        }

        if event.fingerprint.len() == 1
            && (event.fingerprint[0] == "{{ default }}" || event.fingerprint[0] == "{{default}}")
        {
            if let Some(fp) = self.fingerprint.as_deref() {
                event.fingerprint = Cow::Owned(fp.to_owned());
            }
        }

        for processor in self.event_processors.as_ref() {
            event = processor(event)?;
        }

        Some(event)
    }

    /// Set the given [`TransactionOrSpan`] as the active span for this scope.
    pub fn set_span(&mut self, span: Option<TransactionOrSpan>) {
        self.span = Arc::new(span);
    }

    /// Returns the currently active span.
    pub fn get_span(&self) -> Option<TransactionOrSpan> {
        self.span.as_ref().clone()
    }

    pub(crate) fn update_session_from_event(&self, event: &Event<'static>) -> Option<Session> {
        let mut session = self.session.lock().unwrap_or_else(PoisonError::into_inner);
        match session.as_mut()?.update_from_event(event) {
            SessionUpdate::NeedsFlushing(update) => Some(update),
            SessionUpdate::Unchanged => None,
        }
    }

    pub(crate) fn set_session(&self, session: Option<Session>) -> Option<Session> {
        std::mem::replace(
            &mut *self.session.lock().unwrap_or_else(PoisonError::into_inner),
            session,
        )
    }

    pub(crate) fn apply_propagation_context(&self, event: &mut Event<'_>) {
        if event.contexts.contains_key("trace") {
            return;
        }

        let context = TraceContext {
            trace_id: self.propagation_context.trace_id,
            span_id: self.propagation_context.span_id,
            ..Default::default()
        };
        event.contexts.insert("trace".into(), context.into());
    }

    /// Returns the headers needed for distributed tracing.
    pub fn iter_trace_propagation_headers(&self) -> impl Iterator<Item = TraceHeader> {
        if let Some(span) = self.get_span() {
            span.iter_headers()
        } else {
            let data = SentryTrace::new(
                self.propagation_context.trace_id,
                self.propagation_context.span_id,
                None,
            );
            TraceHeadersIter::new(data.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_leaves_scope_untouched() {
        let mut scope = Scope::default();
        scope.set_tag("component", "worker");
        scope.set_extra("attempt", 7.into());
        scope.set_user(Some(User {
            username: Some("john-doe".into()),
            ..Default::default()
        }));

        let before = scope.clone();
        let event = scope.apply_to_event(Default::default()).unwrap();

        assert_eq!(event.tags["component"], "worker");
        assert_eq!(event.extra["attempt"], Value::from(7));
        assert_eq!(event.user.unwrap().username.unwrap(), "john-doe");
        assert_eq!(scope.tags, before.tags);
        assert_eq!(scope.extra, before.extra);
        assert_eq!(scope.user, before.user);
    }

    #[test]
    fn test_event_values_win_over_scope() {
        let mut scope = Scope::default();
        scope.set_user(Some(User {
            username: Some("scope-user".into()),
            ..Default::default()
        }));
        scope.set_level(Some(Level::Warning));

        let event = Event {
            user: Some(User {
                username: Some("event-user".into()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let event = scope.apply_to_event(event).unwrap();
        assert_eq!(event.user.unwrap().username.unwrap(), "event-user");
        assert_eq!(event.level, Level::Warning);
    }

    #[test]
    fn test_processors_run_in_order_and_can_drop() {
        let mut scope = Scope::default();
        scope.add_event_processor(|mut event| {
            event.tags.insert("first".into(), "1".into());
            Some(event)
        });
        scope.add_event_processor(|event| {
            assert!(event.tags.contains_key("first"));
            None
        });
        scope.add_event_processor(|_| panic!("must not run after a drop"));

        assert!(scope.apply_to_event(Default::default()).is_none());
    }

    #[test]
    fn test_clear_resets_everything() {
        let mut scope = Scope::default();
        scope.set_tag("a", "b");
        scope.set_transaction(Some("GET /"));
        scope.clear();
        assert!(scope.tags.is_empty());
        assert!(scope.transaction.is_none());
    }

    #[test]
    fn test_propagation_context_applied() {
        let scope = Scope::default();
        let mut event = Event::default();
        scope.apply_propagation_context(&mut event);
        match event.contexts.get("trace") {
            Some(Context::Trace(trace)) => {
                assert_eq!(trace.trace_id, scope.propagation_context.trace_id);
            }
            _ => panic!("expected a trace context"),
        }
    }
}
