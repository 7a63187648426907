//! Release health sessions.

use std::borrow::Cow;
use std::time::{Instant, SystemTime};

use serde::ser::SerializeStruct;
use uuid::Uuid;

use crate::clientoptions::SessionMode;
use crate::protocol::{Event, Level, SessionStatus};
use crate::scope::StackLayer;
use crate::utils::to_rfc3339;

pub enum SessionUpdate {
    NeedsFlushing(Session),
    Unchanged,
}

/// A single release health session and its lifecycle state.
#[derive(Clone, Debug)]
pub struct Session {
    session_id: Uuid,
    distinct_id: Option<String>,
    status: SessionStatus,
    errors: u64,
    release: Cow<'static, str>,
    environment: Cow<'static, str>,
    mode: SessionMode,
    started: Instant,
    started_utc: SystemTime,
    last_update: SystemTime,
    duration: Option<f64>,
    init: bool,
    dirty: bool,
}

impl Session {
    pub(crate) fn from_stack(stack: &StackLayer) -> Option<Self> {
        let options = stack.client.as_ref()?.options();
        let distinct_id = stack.scope.user().and_then(|user| {
            user.id
                .as_ref()
                .or(user.email.as_ref())
                .or(user.username.as_ref())
                .cloned()
        });
        Some(Self {
            session_id: Uuid::new_v4(),
            distinct_id,
            status: SessionStatus::Ok,
            errors: 0,
            release: options.release.clone()?,
            environment: options
                .environment
                .clone()
                .unwrap_or(Cow::Borrowed("production")),
            mode: options.session_mode,
            started: Instant::now(),
            started_utc: SystemTime::now(),
            last_update: SystemTime::now(),
            duration: None,
            init: true,
            dirty: true,
        })
    }

    /// The identifier of this session.
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// The current status of this session.
    pub fn status(&self) -> SessionStatus {
        self.status
    }

    /// The number of errored events this session observed.
    pub fn errors(&self) -> u64 {
        self.errors
    }

    fn is_terminated(&self) -> bool {
        !matches!(self.status, SessionStatus::Ok | SessionStatus::Errored)
    }

    pub(crate) fn update_from_event(&mut self, event: &Event<'static>) -> SessionUpdate {
        let mut has_error = event.level >= Level::Error;
        let mut is_crash = event.level == Level::Fatal;
        for exc in &event.exception.values {
            has_error = true;
            if let Some(mechanism) = &exc.mechanism {
                if matches!(mechanism.handled, Some(false)) {
                    is_crash = true;
                    break;
                }
            }
        }

        if is_crash && !self.is_terminated() {
            self.status = SessionStatus::Crashed;
            self.dirty = true;
        }
        if has_error {
            self.errors += 1;
            if self.status == SessionStatus::Ok {
                self.status = SessionStatus::Errored;
            }
            self.dirty = true;
        }

        if self.dirty {
            self.last_update = SystemTime::now();
            self.dirty = false;
            let session = self.clone();
            self.init = false;
            SessionUpdate::NeedsFlushing(session)
        } else {
            SessionUpdate::Unchanged
        }
    }

    pub(crate) fn close(&mut self, status: SessionStatus) {
        if self.mode == SessionMode::Application {
            self.duration = Some(self.started.elapsed().as_secs_f64());
        }
        self.last_update = SystemTime::now();
        if !self.is_terminated() {
            self.status = match status {
                SessionStatus::Ok | SessionStatus::Errored | SessionStatus::Exited => {
                    SessionStatus::Exited
                }
                terminal => terminal,
            };
        }
    }
}

impl serde::Serialize for Session {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        #[derive(serde::Serialize)]
        struct Attrs<'a> {
            release: &'a str,
            environment: &'a str,
        }

        let mut session = serializer.serialize_struct("Session", 9)?;
        session.serialize_field("sid", &self.session_id.as_simple().to_string())?;
        match self.distinct_id {
            Some(ref did) => session.serialize_field("did", did)?,
            None => session.skip_field("did")?,
        }
        session.serialize_field("init", &self.init)?;
        session.serialize_field("started", &to_rfc3339(&self.started_utc))?;
        session.serialize_field("timestamp", &to_rfc3339(&self.last_update))?;
        session.serialize_field("status", &self.status.to_string())?;
        session.serialize_field("errors", &self.errors)?;
        match self.duration {
            Some(duration) => {
                session.serialize_field("duration", &((duration * 1000.0).round() / 1000.0))?
            }
            None => session.skip_field("duration")?,
        }
        session.serialize_field(
            "attrs",
            &Attrs {
                release: &self.release,
                environment: &self.environment,
            },
        )?;

        session.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::protocol::Exception;
    use crate::scope::Scope;
    use crate::test::TestTransport;
    use crate::{Client, ClientOptions};

    fn test_session() -> Session {
        let options = ClientOptions {
            dsn: Some("https://public@example.com/1".parse().unwrap()),
            release: Some("my-app@1.0.0".into()),
            transport: Some(Arc::new(TestTransport::new())),
            ..Default::default()
        };
        let client = Arc::new(Client::new(options).unwrap());
        let layer = StackLayer {
            client: Some(client),
            scope: Arc::new(Scope::default()),
        };
        Session::from_stack(&layer).unwrap()
    }

    #[test]
    fn test_session_serialization() {
        let mut session = test_session();
        let payload = serde_json::to_string(&session).unwrap();
        assert!(payload.starts_with(r#"{"sid":""#));
        assert!(payload.contains(r#""init":true"#));
        assert!(payload.contains(r#""status":"ok","errors":0"#));
        assert!(payload.contains(r#""attrs":{"release":"my-app@1.0.0","environment":"production"}"#));

        session.close(SessionStatus::Exited);
        let payload = serde_json::to_string(&session).unwrap();
        assert!(payload.contains(r#""status":"exited""#));
        assert!(payload.contains(r#""duration":"#));
    }

    #[test]
    fn test_session_error_state_machine() {
        let mut session = test_session();
        assert!(matches!(
            session.update_from_event(&Default::default()),
            SessionUpdate::NeedsFlushing(_)
        ));

        let event = Event {
            level: Level::Error,
            ..Default::default()
        };
        match session.update_from_event(&event) {
            SessionUpdate::NeedsFlushing(update) => {
                assert_eq!(update.status(), SessionStatus::Errored);
                assert_eq!(update.errors(), 1);
                assert!(!serde_json::to_string(&update).unwrap().contains(r#""init":true"#));
            }
            SessionUpdate::Unchanged => panic!("expected a session update"),
        }

        let info = Event {
            level: Level::Info,
            ..Default::default()
        };
        assert!(matches!(
            session.update_from_event(&info),
            SessionUpdate::Unchanged
        ));
    }

    #[test]
    fn test_session_crash_from_unhandled_mechanism() {
        let mut session = test_session();
        let event = Event {
            exception: vec![Exception {
                ty: "NativeCrash".into(),
                mechanism: Some(crate::protocol::Mechanism {
                    ty: "signalhandler".into(),
                    handled: Some(false),
                    ..Default::default()
                }),
                ..Default::default()
            }]
            .into(),
            ..Default::default()
        };
        session.update_from_event(&event);
        assert_eq!(session.status(), SessionStatus::Crashed);

        // a later clean close does not resurrect the session
        session.close(SessionStatus::Exited);
        assert_eq!(session.status(), SessionStatus::Crashed);
    }
}
