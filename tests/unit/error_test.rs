//! Tests for error types

use idle_until_urgent::core::SchedulerError;

#[test]
fn test_invalid_config_error() {
    let err = SchedulerError::InvalidConfig("empty platform list".to_string());
    assert_eq!(format!("{}", err), "invalid config: empty platform list");
}

#[test]
fn test_parse_error_from_serde() {
    let parse = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
    let err: SchedulerError = parse.into();
    assert!(matches!(err, SchedulerError::Parse(_)));
    assert!(err.to_string().starts_with("parse error:"));
}

#[test]
fn test_spawn_error_from_io() {
    let io = std::io::Error::new(std::io::ErrorKind::Other, "no threads left");
    let err: SchedulerError = io.into();
    assert_eq!(err.to_string(), "spawn failed: no threads left");
}
