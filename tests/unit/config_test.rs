//! Tests for configuration parsing and validation

use std::time::Duration;

use idle_until_urgent::config::{IdleQueueConfig, UnloadFallback};
use idle_until_urgent::core::SchedulerError;

#[test]
fn test_default_config_is_valid() {
    let config = IdleQueueConfig::default();
    assert!(!config.ensure_tasks_run);
    assert_eq!(config.default_min_task_time(), Duration::ZERO);
    assert_eq!(config.unload_fallback, UnloadFallback::Never);
    assert!(config.validate().is_ok());
}

#[test]
fn test_empty_platform_list_is_invalid() {
    let config = IdleQueueConfig::new().with_unload_fallback(UnloadFallback::Platforms(vec![]));
    assert!(config.validate().is_err());

    let blank = IdleQueueConfig::new()
        .with_unload_fallback(UnloadFallback::Platforms(vec!["  ".into()]));
    assert!(blank.validate().is_err());
}

#[test]
fn test_parse_partial_json_uses_defaults() {
    let config = IdleQueueConfig::from_json_str(r#"{"ensure_tasks_run": true}"#).unwrap();
    assert!(config.ensure_tasks_run);
    assert_eq!(config.default_min_task_time_ms, 0);
    assert_eq!(config.unload_fallback, UnloadFallback::Never);
}

#[test]
fn test_parse_full_json() {
    let config = IdleQueueConfig::from_json_str(
        r#"{
            "ensure_tasks_run": true,
            "default_min_task_time_ms": 5,
            "unload_fallback": {"platforms": ["safari", "webkit"]}
        }"#,
    )
    .unwrap();
    assert_eq!(config.default_min_task_time(), Duration::from_millis(5));
    assert!(config.unload_fallback.applies_to(Some("WebKit")));
    assert!(!config.unload_fallback.applies_to(Some("chrome")));
    assert!(!config.unload_fallback.applies_to(None));
}

#[test]
fn test_parse_rejects_malformed_json() {
    let err = IdleQueueConfig::from_json_str("not json").unwrap_err();
    assert!(matches!(err, SchedulerError::Parse(_)));
}

#[test]
fn test_unload_fallback_always_applies() {
    assert!(UnloadFallback::Always.applies_to(None));
    assert!(!UnloadFallback::Never.applies_to(Some("safari")));
}

#[test]
fn test_config_round_trips_through_json() {
    let config = IdleQueueConfig::new()
        .with_ensure_tasks_run(true)
        .with_default_min_task_time(Duration::from_millis(3))
        .with_unload_fallback(UnloadFallback::Always);
    let json = serde_json::to_string(&config).unwrap();
    assert_eq!(IdleQueueConfig::from_json_str(&json).unwrap(), config);
}
