use crate::config::{ConfigError, TransferConfig};
use crate::sim::SimTime;

#[test]
fn empty_document_uses_defaults() {
    let cfg = TransferConfig::from_json("{}").expect("defaults are valid");
    assert_eq!(cfg, TransferConfig::default());

    let tcp = cfg.tcp_config();
    assert_eq!(tcp.mss, 1460);
    assert_eq!(tcp.init_rto, SimTime::from_secs(1));
    assert_eq!(tcp.max_rto, SimTime::from_secs(60));
    let ch = cfg.channel_config();
    assert_eq!(ch.latency, SimTime::from_millis(10));
    assert_eq!(ch.loss, 0.0);
}

#[test]
fn partial_sections_override_fields() {
    let cfg = TransferConfig::from_json(
        r#"{
            "schema_version": 1,
            "tcp": { "mss": 536, "init_rto_ms": 500 },
            "channel": { "latency_us": 5000, "jitter_us": 250, "loss": 0.05, "seed": 7 },
            "transfer": { "data_bytes": 200000, "echo": true }
        }"#,
    )
    .expect("valid config");

    let tcp = cfg.tcp_config();
    assert_eq!(tcp.mss, 536);
    assert_eq!(tcp.init_rto, SimTime::from_millis(500));
    assert_eq!(tcp.init_window_segments, 1);

    let ch = cfg.channel_config();
    assert_eq!(ch.latency, SimTime::from_millis(5));
    assert_eq!(ch.jitter, SimTime::from_micros(250));
    assert_eq!(ch.loss, 0.05);
    assert_eq!(ch.seed, 7);

    assert_eq!(cfg.transfer.data_bytes, 200_000);
    assert!(cfg.transfer.echo);
}

#[test]
fn unknown_fields_are_rejected() {
    let err = TransferConfig::from_json(r#"{ "tcp": { "cwnd": 10 } }"#).unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)), "got {err:?}");
}

#[test]
fn invalid_values_are_rejected() {
    for raw in [
        r#"{ "schema_version": 2 }"#,
        r#"{ "tcp": { "mss": 0 } }"#,
        r#"{ "tcp": { "mss": 70000 } }"#,
        r#"{ "tcp": { "init_window_segments": 0 } }"#,
        r#"{ "tcp": { "min_rto_ms": 10, "max_rto_ms": 5 } }"#,
        r#"{ "tcp": { "init_rto_ms": 0 } }"#,
        r#"{ "tcp": { "init_rto_ms": 0, "min_rto_ms": 0 } }"#,
        r#"{ "channel": { "loss": 1.0 } }"#,
        r#"{ "channel": { "corrupt": -0.1 } }"#,
        r#"{ "channel": { "duplicate": 2.0 } }"#,
    ] {
        let err = TransferConfig::from_json(raw).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)), "{raw}: got {err:?}");
    }
}

#[test]
fn missing_file_reports_path() {
    let path = std::env::temp_dir().join("minitcp-rs-does-not-exist.json");
    let err = TransferConfig::load(&path).unwrap_err();
    match err {
        ConfigError::Io { path: p, .. } => assert_eq!(p, path),
        other => panic!("expected Io error, got {other:?}"),
    }
}
