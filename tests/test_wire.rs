use sentry_uplink as sentry;

use sentry::test::with_captured_envelopes;

#[test]
fn test_capture_message_wire_format() {
    let envelopes = with_captured_envelopes(|| {
        sentry::capture_message("integration test message", sentry::Level::Warning);
    });
    assert_eq!(envelopes.len(), 1);

    let body = String::from_utf8(envelopes[0].to_vec()).unwrap();
    let lines: Vec<&str> = body.split('\n').collect();
    assert_eq!(lines.len(), 3);

    // envelope header
    let header: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
    assert!(header["event_id"].is_string());
    assert_eq!(header["event_id"].as_str().unwrap().len(), 32);
    assert_eq!(
        header["dsn"].as_str().unwrap(),
        "https://public@sentry.invalid/1"
    );
    assert!(header["sent_at"].as_str().unwrap().ends_with('Z'));
    assert_eq!(header["sdk"]["name"], "sentry-zig");
    assert!(lines[0].contains("sentry-zig"));

    // item header with an exact byte length
    assert!(lines[1].starts_with(r#"{"type":"event","length":"#));
    let item_header: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
    assert_eq!(
        item_header["length"].as_u64().unwrap() as usize,
        lines[2].len()
    );

    // payload
    assert!(lines[2].contains(r#""level":"warning""#));
    assert!(lines[2].contains("integration test message"));
}

#[test]
fn test_sent_at_is_canonical_rfc3339() {
    let envelopes = with_captured_envelopes(|| {
        sentry::capture_message("clock check", sentry::Level::Info);
    });
    let body = String::from_utf8(envelopes[0].to_vec()).unwrap();
    let header: serde_json::Value =
        serde_json::from_str(body.split('\n').next().unwrap()).unwrap();
    let sent_at = header["sent_at"].as_str().unwrap();
    // YYYY-MM-DDTHH:MM:SS.mmmZ
    assert_eq!(sent_at.len(), 24);
    assert_eq!(&sent_at[4..5], "-");
    assert_eq!(&sent_at[10..11], "T");
    assert_eq!(&sent_at[19..20], ".");
}
