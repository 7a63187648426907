use std::fs;
use std::sync::Arc;

use sentry_uplink as sentry;

use sentry::test::TestTransport;
use sentry::{ClientOptions, Level};

fn temp_cache_dir() -> std::path::PathBuf {
    let dir = std::env::temp_dir().join(format!("crash-replay-{}", sentry::Uuid::new_v4()));
    fs::create_dir_all(&dir).unwrap();
    dir
}

#[test]
fn test_marker_is_replayed_as_fatal_event_on_init() {
    let dir = temp_cache_dir();
    fs::write(sentry::crash::marker_path(&dir), "signal:11\n").unwrap();

    let transport = TestTransport::new();
    let options = ClientOptions {
        dsn: Some("https://public@sentry.invalid/1".parse().unwrap()),
        transport: Some(Arc::new(transport.clone())),
        cache_dir: dir.clone(),
        install_signal_handlers: false,
        ..Default::default()
    };
    let guard = sentry::init(options).unwrap();

    let envelopes = transport.fetch_and_clear_envelopes();
    assert_eq!(envelopes.len(), 1);
    let event = envelopes[0].event().unwrap();
    assert_eq!(event.level, Level::Fatal);
    let exception = &event.exception[0];
    assert_eq!(exception.ty, "NativeCrash");
    let value = exception.value.as_deref().unwrap();
    assert!(value.contains("SIGSEGV"));
    assert!(value.contains("signal 11"));

    // the marker is consumed
    assert!(!sentry::crash::marker_path(&dir).exists());

    drop(guard);
    fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_init_without_marker_stays_quiet() {
    let dir = temp_cache_dir();

    let transport = TestTransport::new();
    let options = ClientOptions {
        dsn: Some("https://public@sentry.invalid/1".parse().unwrap()),
        transport: Some(Arc::new(transport.clone())),
        cache_dir: dir.clone(),
        install_signal_handlers: false,
        ..Default::default()
    };
    let guard = sentry::init(options).unwrap();
    drop(guard);

    assert!(transport.fetch_and_clear_envelopes().is_empty());
    fs::remove_dir_all(&dir).ok();
}
