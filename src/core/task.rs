//! Task entries and the state captured when they are queued.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::host::Visibility;

/// Snapshot taken when a task is queued.
///
/// Handed to the task when it runs and exposed through
/// [`IdleQueue::state`](crate::core::IdleQueue::state) while it runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskState {
    /// Enqueue timestamp in milliseconds since epoch.
    pub created_at_ms: u128,
    /// Host visibility at enqueue time.
    pub visibility: Visibility,
}

/// Deferred unit of work.
pub type Task = Box<dyn FnOnce(&TaskState) + Send + 'static>;

/// Per-task options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskOptions {
    /// Minimum idle time that must remain before the task may start.
    /// Falls back to the queue's configured default.
    pub min_task_time: Option<Duration>,
}

impl TaskOptions {
    /// Options with an explicit minimum task time.
    #[must_use]
    pub const fn with_min_task_time(min_task_time: Duration) -> Self {
        Self {
            min_task_time: Some(min_task_time),
        }
    }
}

/// Queued task, owned by the queue until popped.
pub(crate) struct TaskEntry {
    pub task: Task,
    pub state: TaskState,
    pub min_task_time: Duration,
}

impl TaskEntry {
    /// Consume the entry and run its task.
    pub fn run(self) {
        let Self { task, state, .. } = self;
        task(&state);
    }
}

impl fmt::Debug for TaskEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskEntry")
            .field("state", &self.state)
            .field("min_task_time", &self.min_task_time)
            .finish_non_exhaustive()
    }
}
