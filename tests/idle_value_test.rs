//! Integration tests for idle values and named idle properties.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use idle_until_urgent::core::{IdleProperties, IdleValue};
use idle_until_urgent::infra::idle::{ManualIdleSource, ThreadIdleHost};

const PERIOD: Duration = Duration::from_millis(50);

type BoxedInit = Box<dyn FnOnce() -> String + Send>;

fn counter() -> Arc<AtomicUsize> {
    Arc::new(AtomicUsize::new(0))
}

fn counting_init(calls: &Arc<AtomicUsize>, value: &'static str) -> impl FnOnce() -> String + Send {
    let calls = Arc::clone(calls);
    move || {
        calls.fetch_add(1, Ordering::SeqCst);
        value.to_string()
    }
}

#[test]
fn test_initializes_in_idle_period() {
    let source = Arc::new(ManualIdleSource::new());
    let calls = counter();
    let value = IdleValue::new(counting_init(&calls, "computed"), source.clone());

    assert!(!value.is_initialized());
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    assert!(source.fire_next(PERIOD));
    assert!(value.is_initialized());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(value.get(), "computed");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_read_before_idle_runs_init_and_cancels_request() {
    let source = Arc::new(ManualIdleSource::new());
    let calls = counter();
    let value = IdleValue::new(counting_init(&calls, "eager"), source.clone());

    assert_eq!(value.get(), "eager");
    assert_eq!(source.pending(), 0);
    assert_eq!(source.fire_all(PERIOD), 0);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_init_runs_at_most_once() {
    let source = Arc::new(ManualIdleSource::new());
    let calls = counter();
    let value = IdleValue::new(counting_init(&calls, "once"), source.clone());

    for _ in 0..3 {
        assert_eq!(value.with(String::len), 4);
    }
    source.fire_all(PERIOD);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_set_overrides_and_cancels_init() {
    let source = Arc::new(ManualIdleSource::new());
    let calls = counter();
    let value = IdleValue::new(counting_init(&calls, "initial"), source.clone());

    value.set("override".to_string());
    assert!(value.is_initialized());
    assert_eq!(source.pending(), 0);
    assert_eq!(value.get(), "override");
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_set_after_init_replaces_value() {
    let source = Arc::new(ManualIdleSource::new());
    let value = IdleValue::new(|| 1_u32, source.clone());
    source.fire_next(PERIOD);
    assert_eq!(value.get(), 1);

    value.set(2);
    assert_eq!(value.get(), 2);
}

#[test]
fn test_panicking_init_poisons_value() {
    let source = Arc::new(ManualIdleSource::new());
    let value: IdleValue<u32> = IdleValue::new(|| panic!("init failed"), source.clone());

    assert!(catch_unwind(AssertUnwindSafe(|| value.get())).is_err());
    assert!(!value.is_initialized());
    assert!(catch_unwind(AssertUnwindSafe(|| value.get())).is_err());

    value.set(7);
    assert_eq!(value.get(), 7);
}

#[test]
fn test_properties_initialize_independently() {
    let source = Arc::new(ManualIdleSource::new());
    let a_calls = counter();
    let b_calls = counter();
    let mut props = IdleProperties::new(source.clone());
    props.define_all([
        ("a", Box::new(counting_init(&a_calls, "A")) as BoxedInit),
        ("b", Box::new(counting_init(&b_calls, "B")) as BoxedInit),
    ]);

    assert_eq!(props.len(), 2);
    assert_eq!(props.names().collect::<Vec<_>>(), vec!["a", "b"]);

    assert_eq!(props.get("b").as_deref(), Some("B"));
    assert_eq!(a_calls.load(Ordering::SeqCst), 0);
    assert_eq!(source.pending(), 1);

    source.fire_all(PERIOD);
    assert_eq!(a_calls.load(Ordering::SeqCst), 1);
    assert_eq!(props.with("a", String::clone).as_deref(), Some("A"));
    assert_eq!(b_calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_redefining_property_cancels_previous_init() {
    let source = Arc::new(ManualIdleSource::new());
    let calls = counter();
    let mut props = IdleProperties::new(source.clone());
    props.define("p", counting_init(&calls, "old"));
    props.define("p", || "new".to_string());

    assert_eq!(source.pending(), 1);
    source.fire_all(PERIOD);
    assert_eq!(props.get("p").as_deref(), Some("new"));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_initializes_on_host_thread() {
    let host = Arc::new(ThreadIdleHost::new().expect("host thread"));
    let value = IdleValue::new(|| std::thread::current().name().map(str::to_owned), host.clone());

    let deadline = Instant::now() + Duration::from_secs(5);
    while !value.is_initialized() {
        assert!(Instant::now() < deadline, "idle value never initialised");
        std::thread::sleep(Duration::from_millis(1));
    }
    assert_eq!(value.get().as_deref(), Some("idle-host"));
    assert_eq!(host.pending(), 0);
}
