//! In-memory microtask queue drained at caller-chosen checkpoints.

use std::collections::VecDeque;

use parking_lot::Mutex;
use tracing::trace;

use crate::core::host::{Microtask, MicrotaskSource};

/// FIFO microtask queue.
///
/// The owner of the event loop calls [`run_until_empty`](Self::run_until_empty)
/// at each microtask checkpoint. Microtasks queued while the checkpoint runs
/// are run by the same checkpoint.
#[derive(Default)]
pub struct MicrotaskQueue {
    queue: Mutex<VecDeque<Microtask>>,
}

impl MicrotaskQueue {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of queued microtasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    /// Whether no microtask is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    /// Run microtasks until none are left. Returns the number run.
    pub fn run_until_empty(&self) -> usize {
        let mut ran = 0;
        loop {
            let next = self.queue.lock().pop_front();
            let Some(microtask) = next else {
                break;
            };
            microtask();
            ran += 1;
        }
        trace!(ran, "microtask checkpoint");
        ran
    }
}

impl MicrotaskSource for MicrotaskQueue {
    fn schedule(&self, microtask: Microtask) {
        self.queue.lock().push_back(microtask);
    }
}
