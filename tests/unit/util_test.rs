//! Tests for utility functions

use idle_until_urgent::util::clock::now_ms;
use idle_until_urgent::util::telemetry::{init_tracing, init_tracing_with};

#[test]
fn test_now_ms_advances() {
    let before = now_ms();
    std::thread::sleep(std::time::Duration::from_millis(2));
    assert!(now_ms() > before);
}

#[test]
fn test_init_tracing_is_idempotent() {
    init_tracing();
    init_tracing_with("debug");
}
