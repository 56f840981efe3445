//! Core scheduling abstractions: host contracts, the idle queue, lifecycle
//! coupling and idle-initialised values.

pub mod error;
pub mod host;
pub mod idle_queue;
pub mod idle_value;
pub mod lifecycle;
pub mod task;

pub use error::SchedulerError;
pub use host::{
    should_yield, DeadlineSource, Environment, IdleCallback, IdleDeadline, IdleHandle,
    LifecycleEvent, LifecycleListener, ListenerId, Microtask, MicrotaskSource, Visibility,
};
pub use idle_queue::{IdleQueue, SchedulerPhase};
pub use idle_value::{IdleProperties, IdleValue};
pub use lifecycle::{FlushHook, LifecycleMonitor};
pub use task::{Task, TaskOptions, TaskState};
