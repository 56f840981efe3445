//! Tests for builder modules

use std::sync::Arc;
use std::time::Duration;

use idle_until_urgent::builders::build_queue;
use idle_until_urgent::config::{IdleQueueConfig, UnloadFallback};
use idle_until_urgent::core::SchedulerError;
use idle_until_urgent::infra::environment::{AlwaysVisible, ManualEnvironment};
use idle_until_urgent::infra::idle::ManualIdleSource;
use idle_until_urgent::infra::microtask::MicrotaskQueue;
use idle_until_urgent::IdleQueueBuilder;

#[test]
fn test_build_queue_rejects_invalid_config() {
    let config = IdleQueueConfig::new().with_unload_fallback(UnloadFallback::Platforms(vec![]));
    let result = build_queue(
        &config,
        Arc::new(ManualIdleSource::new()),
        Arc::new(MicrotaskQueue::new()),
        Arc::new(AlwaysVisible),
    );
    assert!(matches!(result, Err(SchedulerError::InvalidConfig(_))));
}

#[test]
fn test_builder_with_manual_sources() {
    let idle = Arc::new(ManualIdleSource::new());
    let env = Arc::new(ManualEnvironment::new());
    let queue = IdleQueueBuilder::new(IdleQueueConfig::new().with_ensure_tasks_run(true))
        .idle_source(idle.clone())
        .microtask_source(Arc::new(MicrotaskQueue::new()))
        .environment(env.clone())
        .build()
        .unwrap();

    assert!(queue.has_lifecycle_hooks());
    assert_eq!(env.listener_count(), 1);

    queue.push_task(|_| {});
    assert_eq!(idle.pending(), 1);
    idle.fire_next(Duration::from_millis(50));
    assert!(!queue.has_pending_tasks());
}

#[test]
fn test_builder_from_json() {
    let queue = IdleQueueBuilder::from_json_str(r#"{"default_min_task_time_ms": 8}"#)
        .unwrap()
        .idle_source(Arc::new(ManualIdleSource::new()))
        .microtask_source(Arc::new(MicrotaskQueue::new()))
        .build()
        .unwrap();
    assert_eq!(queue.config().default_min_task_time(), Duration::from_millis(8));
    assert!(!queue.has_lifecycle_hooks());
}

#[test]
fn test_builder_from_bad_json() {
    assert!(matches!(
        IdleQueueBuilder::from_json_str("{"),
        Err(SchedulerError::Parse(_))
    ));
}
