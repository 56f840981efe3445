//! Idle task queue: ordering, scheduling and the deadline-bounded drain loop.
//!
//! Tasks are queued at either end of a deque and drained when the host
//! grants an idle period. The drain stops as soon as the remaining idle time
//! is no longer than the next task's minimum task time, and the rest of the
//! queue is rescheduled for the next idle period.
//!
//! With `ensure_tasks_run` enabled, the queue also guarantees delivery when
//! the host may disappear:
//!
//! - tasks queued while the host is hidden are flushed on the next microtask
//!   instead of waiting for an idle period that may never come,
//! - a visibility change to hidden (and optionally the unload signal) flushes
//!   the whole queue synchronously.
//!
//! ```rust,ignore
//! use idle_until_urgent::builders::IdleQueueBuilder;
//! use idle_until_urgent::config::IdleQueueConfig;
//!
//! let queue = IdleQueueBuilder::new(IdleQueueConfig::new().with_ensure_tasks_run(true))
//!     .build()?;
//!
//! queue.push_task(|state| tracing::info!(?state, "analytics sent"));
//! queue.unshift_task(|_| tracing::info!("runs first"));
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::thread::{self, ThreadId};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, trace, warn};

use crate::config::IdleQueueConfig;
use crate::core::host::{
    should_yield, DeadlineSource, Environment, IdleDeadline, IdleHandle, MicrotaskSource,
    Visibility,
};
use crate::core::lifecycle::{FlushHook, LifecycleMonitor};
use crate::core::task::{TaskEntry, TaskOptions, TaskState};
use crate::util::clock::now_ms;

/// Observable scheduling phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerPhase {
    /// No idle period requested.
    Idle,
    /// An idle period is outstanding.
    Scheduled,
    /// The drain loop is running.
    Draining,
}

#[derive(Debug, Clone, Copy)]
enum QueueEnd {
    Back,
    Front,
}

#[derive(Debug, Default)]
struct QueueCore {
    tasks: VecDeque<TaskEntry>,
    idle_handle: Option<IdleHandle>,
    /// Re-entrancy guard: only one drain runs at a time.
    is_processing: bool,
    /// Thread running the current drain.
    drain_owner: Option<ThreadId>,
    state: Option<TaskState>,
    destroyed: bool,
}

struct Shared {
    config: IdleQueueConfig,
    idle: Arc<dyn DeadlineSource>,
    microtasks: Arc<dyn MicrotaskSource>,
    environment: Arc<dyn Environment>,
    core: Mutex<QueueCore>,
    /// Signalled whenever a drain finishes.
    drained: Condvar,
    lifecycle: Mutex<Option<LifecycleMonitor>>,
}

/// Cooperative queue of deferred tasks.
///
/// Cloning yields another handle to the same queue. Callbacks handed to the
/// host sources hold weak references, so the queue is torn down once the
/// last handle is dropped.
#[derive(Clone)]
pub struct IdleQueue {
    shared: Arc<Shared>,
}

impl IdleQueue {
    /// Create a queue on top of the given host sources.
    ///
    /// Lifecycle hooks are installed on `environment` when
    /// `config.ensure_tasks_run` is set.
    pub fn new(
        config: IdleQueueConfig,
        idle: Arc<dyn DeadlineSource>,
        microtasks: Arc<dyn MicrotaskSource>,
        environment: Arc<dyn Environment>,
    ) -> Self {
        let shared = Arc::new(Shared {
            config,
            idle,
            microtasks,
            environment,
            core: Mutex::new(QueueCore::default()),
            drained: Condvar::new(),
            lifecycle: Mutex::new(None),
        });

        if shared.config.ensure_tasks_run {
            let weak = Arc::downgrade(&shared);
            let flush: FlushHook = Arc::new(move || {
                if let Some(shared) = weak.upgrade() {
                    shared.run_tasks(None);
                }
            });
            let monitor = LifecycleMonitor::install(
                &shared.environment,
                &shared.config.unload_fallback,
                flush,
            );
            *shared.lifecycle.lock() = Some(monitor);
        }

        debug!(
            ensure_tasks_run = shared.config.ensure_tasks_run,
            default_min_task_time_ms = shared.config.default_min_task_time_ms,
            "idle queue created"
        );
        Self { shared }
    }

    /// Append a task to the tail of the queue.
    pub fn push_task<F>(&self, task: F)
    where
        F: FnOnce(&TaskState) + Send + 'static,
    {
        self.push_task_with(task, TaskOptions::default());
    }

    /// Append a task to the tail of the queue with explicit options.
    pub fn push_task_with<F>(&self, task: F, options: TaskOptions)
    where
        F: FnOnce(&TaskState) + Send + 'static,
    {
        self.shared.add_task(QueueEnd::Back, Box::new(task), options);
    }

    /// Insert a task at the head of the queue, ahead of all queued tasks.
    pub fn unshift_task<F>(&self, task: F)
    where
        F: FnOnce(&TaskState) + Send + 'static,
    {
        self.unshift_task_with(task, TaskOptions::default());
    }

    /// Insert a task at the head of the queue with explicit options.
    pub fn unshift_task_with<F>(&self, task: F, options: TaskOptions)
    where
        F: FnOnce(&TaskState) + Send + 'static,
    {
        self.shared.add_task(QueueEnd::Front, Box::new(task), options);
    }

    /// Run every queued task now, ignoring minimum task times.
    ///
    /// Tasks queued by running tasks are drained by the same call. Called
    /// from a task of the running drain, this is a no-op and that drain picks
    /// the work up. Called while another thread is draining, it blocks until
    /// that drain finishes and then runs whatever is left.
    ///
    /// # Panics
    ///
    /// Propagates the panic of any task it runs. Tasks after the panicking
    /// one stay queued and are rescheduled.
    pub fn run_tasks_immediately(&self) {
        self.shared.run_tasks(None);
    }

    /// Whether any task is queued.
    #[must_use]
    pub fn has_pending_tasks(&self) -> bool {
        !self.shared.core.lock().tasks.is_empty()
    }

    /// Number of queued tasks.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.shared.core.lock().tasks.len()
    }

    /// Drop all queued tasks and cancel the outstanding idle request.
    /// A task that is currently running is not affected.
    pub fn clear_pending_tasks(&self) {
        let dropped = {
            let mut core = self.shared.core.lock();
            self.shared.cancel_scheduled_run(&mut core);
            std::mem::take(&mut core.tasks)
        };
        debug!(count = dropped.len(), "cleared pending tasks");
    }

    /// State captured for the task currently running, if any.
    #[must_use]
    pub fn state(&self) -> Option<TaskState> {
        self.shared.core.lock().state
    }

    /// Current scheduling phase.
    #[must_use]
    pub fn phase(&self) -> SchedulerPhase {
        let core = self.shared.core.lock();
        if core.is_processing {
            SchedulerPhase::Draining
        } else if core.idle_handle.is_some() {
            SchedulerPhase::Scheduled
        } else {
            SchedulerPhase::Idle
        }
    }

    /// Configuration the queue was built with.
    #[must_use]
    pub fn config(&self) -> &IdleQueueConfig {
        &self.shared.config
    }

    /// Whether lifecycle hooks are currently installed.
    #[must_use]
    pub fn has_lifecycle_hooks(&self) -> bool {
        self.shared.lifecycle.lock().is_some()
    }

    /// Whether [`destroy`](Self::destroy) has been called.
    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.shared.core.lock().destroyed
    }

    /// Tear the queue down: drop queued tasks, cancel the idle request and
    /// remove lifecycle hooks. Later calls on any handle are no-ops.
    pub fn destroy(&self) {
        let dropped = {
            let mut core = self.shared.core.lock();
            if core.destroyed {
                return;
            }
            core.destroyed = true;
            self.shared.cancel_scheduled_run(&mut core);
            std::mem::take(&mut core.tasks)
        };
        let monitor = self.shared.lifecycle.lock().take();
        if let Some(monitor) = monitor {
            monitor.remove();
        }
        debug!(dropped = dropped.len(), "idle queue destroyed");
    }
}

impl Shared {
    fn add_task(
        self: &Arc<Self>,
        end: QueueEnd,
        task: crate::core::task::Task,
        options: TaskOptions,
    ) {
        let state = TaskState {
            created_at_ms: now_ms(),
            visibility: self.environment.visibility(),
        };
        let entry = TaskEntry {
            task,
            state,
            min_task_time: options
                .min_task_time
                .unwrap_or_else(|| self.config.default_min_task_time()),
        };

        let mut core = self.core.lock();
        if core.destroyed {
            drop(core);
            warn!("task dropped: idle queue destroyed");
            return;
        }
        match end {
            QueueEnd::Back => core.tasks.push_back(entry),
            QueueEnd::Front => core.tasks.push_front(entry),
        }
        trace!(?end, pending = core.tasks.len(), "task queued");
        drop(core);

        self.schedule_tasks_to_run();
    }

    /// Request a drain: on the next microtask while the host is hidden and
    /// delivery is guaranteed, otherwise on the next idle period.
    fn schedule_tasks_to_run(self: &Arc<Self>) {
        if self.config.ensure_tasks_run && self.environment.visibility() == Visibility::Hidden {
            if self.core.lock().destroyed {
                return;
            }
            trace!("host hidden, scheduling drain as microtask");
            let weak = Arc::downgrade(self);
            self.microtasks.schedule(Box::new(move || {
                if let Some(shared) = weak.upgrade() {
                    shared.run_tasks(None);
                }
            }));
            return;
        }

        let mut core = self.core.lock();
        if core.destroyed || core.idle_handle.is_some() {
            return;
        }
        let weak = Arc::downgrade(self);
        let handle = self.idle.request(Box::new(move |deadline: &dyn IdleDeadline| {
            if let Some(shared) = weak.upgrade() {
                shared.run_tasks(Some(deadline));
            }
        }));
        trace!(%handle, "idle period requested");
        core.idle_handle = Some(handle);
    }

    /// Drain until the queue is empty or the deadline runs out. Without a
    /// deadline every task runs.
    ///
    /// An idle period that finds a drain in progress is dropped, as is a
    /// flush from inside the running drain. A flush from any other thread
    /// waits for the running drain and then drains the rest.
    fn run_tasks(self: &Arc<Self>, deadline: Option<&dyn IdleDeadline>) {
        let me = thread::current().id();
        {
            let mut core = self.core.lock();
            loop {
                self.cancel_scheduled_run(&mut core);
                if !core.is_processing {
                    break;
                }
                if deadline.is_some() || core.drain_owner == Some(me) {
                    trace!("drain already in progress");
                    return;
                }
                trace!("waiting for drain on another thread");
                self.drained.wait(&mut core);
            }
            core.is_processing = true;
            core.drain_owner = Some(me);
        }
        let guard = DrainGuard { shared: self };

        let mut ran = 0usize;
        loop {
            let entry = {
                let mut core = self.core.lock();
                let Some(next) = core.tasks.front() else {
                    break;
                };
                if should_yield(deadline, next.min_task_time) {
                    debug!(
                        min_task_time = ?next.min_task_time,
                        remaining = ?deadline.map(|d| d.time_remaining()),
                        "yielding to host"
                    );
                    break;
                }
                let Some(entry) = core.tasks.pop_front() else {
                    break;
                };
                core.state = Some(entry.state);
                entry
            };

            entry.run();
            self.core.lock().state = None;
            ran += 1;
        }

        debug!(ran, forced = deadline.is_none(), "drain finished");
        drop(guard);
    }

    fn cancel_scheduled_run(&self, core: &mut QueueCore) {
        if let Some(handle) = core.idle_handle.take() {
            self.idle.cancel(handle);
            trace!(%handle, "idle period cancelled");
        }
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        let core = self.core.get_mut();
        if let Some(handle) = core.idle_handle.take() {
            self.idle.cancel(handle);
        }
        if !core.tasks.is_empty() {
            debug!(dropped = core.tasks.len(), "idle queue dropped with pending tasks");
        }
    }
}

/// Releases the re-entrancy guard however the drain exits, and reschedules
/// what is left.
struct DrainGuard<'a> {
    shared: &'a Arc<Shared>,
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        let pending = {
            let mut core = self.shared.core.lock();
            core.is_processing = false;
            core.drain_owner = None;
            core.state = None;
            !core.destroyed && !core.tasks.is_empty()
        };
        self.shared.drained.notify_all();
        if std::thread::panicking() {
            warn!(pending, "task panicked during drain");
        }
        if pending {
            self.shared.schedule_tasks_to_run();
        }
    }
}

impl fmt::Debug for IdleQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdleQueue")
            .field("config", &self.shared.config)
            .field("pending", &self.pending_len())
            .field("phase", &self.phase())
            .finish_non_exhaustive()
    }
}
