//! # Idle Until Urgent
//!
//! A cooperative, deadline-aware task queue for deferring low-priority work
//! until the host reports spare time, while guaranteeing that deferred work
//! still runs before the host goes away.
//!
//! ## Core Problem Solved
//!
//! Work such as analytics, cache warming or precomputation should not compete
//! with latency-sensitive work, but it also must not be lost:
//!
//! - **Responsiveness**: tasks only run inside idle periods, and the drain
//!   stops as soon as the remaining time drops to a task's minimum task time
//! - **Delivery**: when the host is hidden or about to unload, the whole queue
//!   is flushed synchronously, or on the next microtask
//! - **No preemption**: tasks are synchronous units; the queue only decides
//!   *when* to run the next one
//!
//! ## Key Features
//!
//! - **FIFO with urgent head insertion**: `push_task` appends,
//!   `unshift_task` jumps the line
//! - **Deadline-bounded drain** with per-task minimum task time
//! - **Re-entrancy guard**: one drain at a time, tasks may queue more work
//! - **Lifecycle coupling**: visibility and unload signals force a flush
//! - **Pluggable hosts**: manual sources for tests and embedding, a dedicated
//!   host thread, or a tokio runtime
//! - **Idle values**: lazily computed values initialised during idle time
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use idle_until_urgent::config::IdleQueueConfig;
//! use idle_until_urgent::core::{IdleQueue, Visibility};
//! use idle_until_urgent::infra::{
//!     environment::ManualEnvironment, idle::ManualIdleSource, microtask::MicrotaskQueue,
//! };
//!
//! let env = Arc::new(ManualEnvironment::new());
//! let idle = Arc::new(ManualIdleSource::new());
//! let queue = IdleQueue::new(
//!     IdleQueueConfig::new().with_ensure_tasks_run(true),
//!     idle.clone(),
//!     Arc::new(MicrotaskQueue::new()),
//!     env.clone(),
//! );
//!
//! queue.push_task(|state| println!("queued at {}", state.created_at_ms));
//!
//! // Either the host grants an idle period...
//! idle.fire_next(std::time::Duration::from_millis(50));
//! // ...or it goes away and the queue is flushed before the handler returns.
//! env.set_visibility(Visibility::Hidden);
//! ```
//!
//! For complete examples, see:
//! - `tests/idle_queue_test.rs` - Ordering, deadlines and flushing
//! - `tests/lifecycle_test.rs` - Visibility and unload coupling

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Core scheduling abstractions: host contracts, the queue, lifecycle coupling.
pub mod core;
/// Configuration models for idle queues.
pub mod config;
/// Builders to construct queues from configuration.
pub mod builders;
/// Host adapters for idle periods, microtasks and environments.
pub mod infra;
/// Runtime-backed host adapters.
pub mod runtime;
/// Shared utilities.
pub mod util;

pub use crate::builders::IdleQueueBuilder;
pub use crate::config::IdleQueueConfig;
pub use crate::core::{IdleQueue, IdleValue, SchedulerError, TaskOptions, TaskState, Visibility};
