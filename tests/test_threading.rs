use std::sync::Arc;
use std::thread;

use sentry_uplink as sentry;

use sentry::test::with_captured_envelopes;
use sentry::Hub;

#[test]
fn test_detached_hub_carries_scope_snapshot() {
    let envelopes = with_captured_envelopes(|| {
        sentry::configure_scope(|scope| {
            scope.set_tag("worker", "worker1");
        });

        let hub = Arc::new(Hub::new_from_top(Hub::current()));
        thread::spawn(move || {
            Hub::run(hub, || {
                sentry::capture_message("Hello from thread!", sentry::Level::Error);
            });
        })
        .join()
        .unwrap();
    });

    assert_eq!(envelopes.len(), 1);
    let event = envelopes[0].event().unwrap();
    assert_eq!(event.message.as_deref(), Some("Hello from thread!"));
    assert_eq!(event.tags.get("worker").map(String::as_str), Some("worker1"));
}

#[test]
fn test_run_restores_previous_hub() {
    with_captured_envelopes(|| {
        let outer = Hub::current();
        let detached = Arc::new(Hub::new_from_top(Hub::current()));
        Hub::run(detached.clone(), || {
            assert!(Arc::ptr_eq(&Hub::current(), &detached));
        });
        assert!(Arc::ptr_eq(&Hub::current(), &outer));
    });
}

#[test]
fn test_scope_mutation_on_detached_hub_is_isolated() {
    let envelopes = with_captured_envelopes(|| {
        let detached = Arc::new(Hub::new_from_top(Hub::current()));
        Hub::run(detached, || {
            sentry::configure_scope(|scope| scope.set_tag("only", "detached"));
            sentry::capture_message("detached", sentry::Level::Info);
        });
        sentry::capture_message("original", sentry::Level::Info);
    });

    assert_eq!(envelopes.len(), 2);
    let detached_event = envelopes[0].event().unwrap();
    let original_event = envelopes[1].event().unwrap();
    assert_eq!(
        detached_event.tags.get("only").map(String::as_str),
        Some("detached")
    );
    assert!(original_event.tags.is_empty());
}

#[test]
fn test_concurrent_captures_from_many_threads() {
    let envelopes = with_captured_envelopes(|| {
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let hub = Arc::new(Hub::new_from_top(Hub::current()));
                thread::spawn(move || {
                    Hub::run(hub, || {
                        for j in 0..10 {
                            sentry::capture_message(
                                &format!("thread {i} message {j}"),
                                sentry::Level::Info,
                            );
                        }
                    });
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
    });

    assert_eq!(envelopes.len(), 80);
}

#[test]
fn test_push_scope_isolation() {
    let envelopes = with_captured_envelopes(|| {
        sentry::configure_scope(|scope| scope.set_tag("base", "yes"));
        {
            let hub = Hub::current();
            let _guard = hub.push_scope();
            hub.configure_scope(|scope| scope.set_tag("pushed", "yes"));
            sentry::capture_message("inner", sentry::Level::Info);
        }
        sentry::capture_message("outer", sentry::Level::Info);
    });

    let inner = envelopes[0].event().unwrap();
    let outer = envelopes[1].event().unwrap();
    assert_eq!(inner.tags.len(), 2);
    assert_eq!(outer.tags.len(), 1);
    assert!(outer.tags.contains_key("base"));
}
