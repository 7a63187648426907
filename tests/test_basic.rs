use sentry_uplink as sentry;

use sentry::test::{with_captured_envelopes, with_captured_envelopes_options};
use sentry::{ClientOptions, Envelope};

fn single_event(envelopes: &[Envelope]) -> &sentry::Event<'static> {
    assert_eq!(envelopes.len(), 1);
    envelopes[0].event().expect("envelope contains an event")
}

#[test]
fn test_basic_capture_message() {
    let envelopes = with_captured_envelopes(|| {
        sentry::configure_scope(|scope| {
            scope.set_tag("worker", "worker1");
        });
        sentry::capture_message("Hello World!", sentry::Level::Warning);
    });

    let event = single_event(&envelopes);
    assert_eq!(event.message.as_deref(), Some("Hello World!"));
    assert_eq!(event.level, sentry::Level::Warning);
    assert_eq!(
        event
            .tags
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect::<Vec<_>>(),
        vec![("worker", "worker1")]
    );
}

#[test]
fn test_breadcrumbs() {
    let envelopes = with_captured_envelopes(|| {
        sentry::add_breadcrumb(|| sentry::Breadcrumb {
            ty: "log".into(),
            message: Some("First breadcrumb".into()),
            ..Default::default()
        });
        sentry::add_breadcrumb(sentry::Breadcrumb {
            ty: "log".into(),
            message: Some("Second breadcrumb".into()),
            ..Default::default()
        });
        sentry::add_breadcrumb(|| {
            vec![
                sentry::Breadcrumb {
                    ty: "log".into(),
                    message: Some("Third breadcrumb".into()),
                    ..Default::default()
                },
                sentry::Breadcrumb {
                    ty: "log".into(),
                    message: Some("Fourth breadcrumb".into()),
                    ..Default::default()
                },
            ]
        });
        sentry::add_breadcrumb(|| None);
        sentry::capture_message("Hello World!", sentry::Level::Warning);
    });

    let event = single_event(&envelopes);
    let messages: Vec<_> = event
        .breadcrumbs
        .iter()
        .map(|x| (x.message.as_deref().unwrap(), x.ty.as_str()))
        .collect();
    assert_eq!(
        messages,
        vec![
            ("First breadcrumb", "log"),
            ("Second breadcrumb", "log"),
            ("Third breadcrumb", "log"),
            ("Fourth breadcrumb", "log"),
        ]
    );
}

#[test]
fn test_breadcrumbs_are_trimmed_to_capacity() {
    let options = ClientOptions {
        max_breadcrumbs: 2,
        ..Default::default()
    };
    let envelopes = with_captured_envelopes_options(
        || {
            for i in 0..5 {
                sentry::add_breadcrumb(sentry::Breadcrumb {
                    message: Some(format!("crumb {i}")),
                    ..Default::default()
                });
            }
            sentry::capture_message("overflow", sentry::Level::Info);
        },
        options,
    );

    let event = single_event(&envelopes);
    let messages: Vec<_> = event
        .breadcrumbs
        .iter()
        .map(|x| x.message.as_deref().unwrap())
        .collect();
    assert_eq!(messages, vec!["crumb 3", "crumb 4"]);
}

#[test]
fn test_before_breadcrumb_discards() {
    let options = ClientOptions {
        before_breadcrumb: Some(std::sync::Arc::new(|breadcrumb: sentry::Breadcrumb| {
            if breadcrumb.category.as_deref() == Some("noise") {
                None
            } else {
                Some(breadcrumb)
            }
        })),
        ..Default::default()
    };
    let envelopes = with_captured_envelopes_options(
        || {
            sentry::add_breadcrumb(sentry::Breadcrumb {
                category: Some("noise".into()),
                ..Default::default()
            });
            sentry::add_breadcrumb(sentry::Breadcrumb {
                category: Some("signal".into()),
                ..Default::default()
            });
            sentry::capture_message("filtered", sentry::Level::Info);
        },
        options,
    );

    let event = single_event(&envelopes);
    assert_eq!(event.breadcrumbs.len(), 1);
    assert_eq!(event.breadcrumbs[0].category.as_deref(), Some("signal"));
}

#[test]
fn test_before_send_drops_event() {
    let options = ClientOptions {
        before_send: Some(std::sync::Arc::new(|_| None)),
        ..Default::default()
    };
    let envelopes = with_captured_envelopes_options(
        || {
            sentry::capture_message("never sent", sentry::Level::Error);
        },
        options,
    );
    assert!(envelopes.is_empty());
}

#[test]
fn test_sample_rate_zero_drops_everything() {
    let options = ClientOptions {
        sample_rate: 0.0,
        ..Default::default()
    };
    let envelopes = with_captured_envelopes_options(
        || {
            for _ in 0..50 {
                sentry::capture_message("dropped", sentry::Level::Error);
            }
        },
        options,
    );
    assert!(envelopes.is_empty());
}

#[test]
fn test_sample_rate_one_keeps_everything() {
    let envelopes = with_captured_envelopes(|| {
        for _ in 0..50 {
            sentry::capture_message("kept", sentry::Level::Error);
        }
    });
    assert_eq!(envelopes.len(), 50);
}

#[test]
fn test_capture_exception() {
    let envelopes = with_captured_envelopes(|| {
        sentry::Hub::with_active(|hub| {
            hub.capture_exception("ValueError", "invalid literal");
        });
    });

    let event = single_event(&envelopes);
    assert_eq!(event.level, sentry::Level::Error);
    assert_eq!(event.exception[0].ty, "ValueError");
    assert_eq!(event.exception[0].value.as_deref(), Some("invalid literal"));
}

#[test]
fn test_capture_error_chain() {
    let envelopes = with_captured_envelopes(|| {
        let err = "NaN".parse::<usize>().unwrap_err();
        sentry::capture_error(&err);
    });

    let event = single_event(&envelopes);
    assert_eq!(event.exception.len(), 1);
    assert!(event.exception[0].value.is_some());
}

#[test]
fn test_last_event_id_is_recorded() {
    with_captured_envelopes(|| {
        assert!(sentry::last_event_id().is_none());
        let id = sentry::capture_message("hello", sentry::Level::Info);
        assert_eq!(sentry::last_event_id(), Some(id));
    });
}

#[test]
fn test_check_in_capture() {
    let envelopes = with_captured_envelopes(|| {
        sentry::capture_check_in(sentry::protocol::MonitorCheckIn {
            check_in_id: sentry::Uuid::new_v4(),
            monitor_slug: "nightly-job".into(),
            status: sentry::protocol::MonitorCheckInStatus::Ok,
            environment: Some("production".into()),
            duration: Some(12.5),
        });
    });

    assert_eq!(envelopes.len(), 1);
    assert!(envelopes[0].uuid().is_none());
    let body = String::from_utf8(envelopes[0].to_vec()).unwrap();
    assert!(body.contains(r#""monitor_slug":"nightly-job""#));
}
