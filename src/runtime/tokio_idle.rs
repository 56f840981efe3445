//! Tokio runtime idle source.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::{Handle, Runtime};
use tokio::task::AbortHandle;
use tracing::trace;

use crate::core::host::{
    DeadlineSource, IdleCallback, IdleDeadline, IdleHandle, Microtask, MicrotaskSource,
};
use crate::core::SchedulerError;
use crate::infra::idle::{InstantDeadline, MAX_IDLE_PERIOD};

/// Idle source that grants idle periods on a tokio runtime.
///
/// Each request becomes a task that first yields to the scheduler, so work
/// that was already runnable goes first, then runs the callback with a fixed
/// budget. Microtasks are spawned directly.
pub struct TokioIdleSource {
    handle: Handle,
    runtime: Option<Runtime>,
    tasks: Arc<Mutex<HashMap<IdleHandle, AbortHandle>>>,
    next_id: AtomicU64,
    budget: Duration,
}

impl TokioIdleSource {
    /// Spawn idle work on an existing runtime.
    #[must_use]
    pub fn new(handle: Handle) -> Self {
        Self {
            handle,
            runtime: None,
            tasks: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(1),
            budget: MAX_IDLE_PERIOD,
        }
    }

    /// Own a new multi-threaded runtime with `worker_threads` workers.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Spawn`] if the runtime cannot be built.
    pub fn with_worker_threads(worker_threads: usize) -> Result<Self, SchedulerError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(worker_threads)
            .thread_name("idle-tokio")
            .enable_all()
            .build()?;
        let mut source = Self::new(runtime.handle().clone());
        source.runtime = Some(runtime);
        Ok(source)
    }

    /// Set the budget granted per idle period.
    #[must_use]
    pub const fn with_budget(mut self, budget: Duration) -> Self {
        self.budget = budget;
        self
    }

    /// Budget granted per idle period.
    #[must_use]
    pub const fn budget(&self) -> Duration {
        self.budget
    }

    /// Number of idle requests not yet fired or cancelled.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.tasks.lock().len()
    }
}

impl DeadlineSource for TokioIdleSource {
    fn request(&self, callback: IdleCallback) -> IdleHandle {
        let handle = IdleHandle::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let tasks = Arc::clone(&self.tasks);
        let budget = self.budget;

        // Held across spawn so the task cannot look itself up before it is registered.
        let mut registry = self.tasks.lock();
        let join = self.handle.spawn(async move {
            tokio::task::yield_now().await;
            if tasks.lock().remove(&handle).is_none() {
                return;
            }
            let deadline = InstantDeadline::new(budget);
            callback(&deadline as &dyn IdleDeadline);
        });
        registry.insert(handle, join.abort_handle());
        trace!(%handle, "idle task spawned");
        handle
    }

    fn cancel(&self, handle: IdleHandle) {
        let aborted = self.tasks.lock().remove(&handle);
        if let Some(abort) = aborted {
            abort.abort();
        }
    }
}

impl MicrotaskSource for TokioIdleSource {
    fn schedule(&self, microtask: Microtask) {
        self.handle.spawn(async move { microtask() });
    }
}

impl Drop for TokioIdleSource {
    fn drop(&mut self) {
        for (_, abort) in self.tasks.lock().drain() {
            abort.abort();
        }
        // Dropping a runtime from async context panics.
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}
