//! In-memory idle source driven by the caller, plus deadline types.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::trace;

use crate::core::host::{DeadlineSource, IdleCallback, IdleDeadline, IdleHandle};

/// Longest idle period a host grants in one go.
pub const MAX_IDLE_PERIOD: Duration = Duration::from_millis(50);

/// Deadline reporting a constant remaining time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedDeadline {
    remaining: Duration,
}

impl FixedDeadline {
    /// Deadline with `remaining` time left.
    #[must_use]
    pub const fn new(remaining: Duration) -> Self {
        Self { remaining }
    }
}

impl IdleDeadline for FixedDeadline {
    fn time_remaining(&self) -> Duration {
        self.remaining
    }
}

/// Wall-clock deadline: `budget` minus the time elapsed since creation.
#[derive(Debug, Clone, Copy)]
pub struct InstantDeadline {
    started: Instant,
    budget: Duration,
}

impl InstantDeadline {
    /// Start a deadline of `budget` now.
    #[must_use]
    pub fn new(budget: Duration) -> Self {
        Self {
            started: Instant::now(),
            budget,
        }
    }
}

impl IdleDeadline for InstantDeadline {
    fn time_remaining(&self) -> Duration {
        self.budget.saturating_sub(self.started.elapsed())
    }
}

/// Idle source whose periods are granted explicitly by the caller.
///
/// Requests are kept in FIFO order; [`fire_next`](Self::fire_next) pops the
/// oldest and runs it with the given budget. Useful for tests and for hosts
/// that already own an event loop and want to drive idle work themselves.
#[derive(Default)]
pub struct ManualIdleSource {
    next_id: AtomicU64,
    requests: Mutex<VecDeque<(IdleHandle, IdleCallback)>>,
}

impl ManualIdleSource {
    /// Create an empty source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of outstanding requests.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.requests.lock().len()
    }

    /// Grant the oldest request an idle period of `remaining`.
    /// Returns false if nothing was pending.
    pub fn fire_next(&self, remaining: Duration) -> bool {
        self.fire_next_with(&FixedDeadline::new(remaining))
    }

    /// Grant the oldest request an idle period described by `deadline`.
    pub fn fire_next_with(&self, deadline: &dyn IdleDeadline) -> bool {
        // Callbacks may request again, so the lock is released before running.
        let next = self.requests.lock().pop_front();
        let Some((handle, callback)) = next else {
            return false;
        };
        trace!(%handle, remaining = ?deadline.time_remaining(), "granting idle period");
        callback(deadline);
        true
    }

    /// Grant every request outstanding at call time. Requests made by the
    /// callbacks themselves stay pending. Returns the number fired.
    pub fn fire_all(&self, remaining: Duration) -> usize {
        let outstanding = self.pending();
        let mut fired = 0;
        for _ in 0..outstanding {
            if !self.fire_next(remaining) {
                break;
            }
            fired += 1;
        }
        fired
    }
}

impl DeadlineSource for ManualIdleSource {
    fn request(&self, callback: IdleCallback) -> IdleHandle {
        let handle = IdleHandle::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.requests.lock().push_back((handle, callback));
        handle
    }

    fn cancel(&self, handle: IdleHandle) {
        // Drop the callback outside the lock; it may own a queue handle.
        let cancelled = {
            let mut requests = self.requests.lock();
            requests
                .iter()
                .position(|(h, _)| *h == handle)
                .and_then(|idx| requests.remove(idx))
        };
        drop(cancelled);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[test]
    fn test_fires_in_request_order() {
        let source = ManualIdleSource::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..3 {
            let order = Arc::clone(&order);
            source.request(Box::new(move |_: &dyn IdleDeadline| order.lock().push(i)));
        }

        assert_eq!(source.fire_all(Duration::from_millis(10)), 3);
        assert_eq!(*order.lock(), vec![0, 1, 2]);
        assert!(!source.fire_next(Duration::ZERO));
    }

    #[test]
    fn test_cancel_removes_request() {
        let source = ManualIdleSource::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let c1 = Arc::clone(&calls);
        let first = source.request(Box::new(move |_: &dyn IdleDeadline| {
            c1.fetch_add(1, Ordering::SeqCst);
        }));
        let c2 = Arc::clone(&calls);
        source.request(Box::new(move |_: &dyn IdleDeadline| {
            c2.fetch_add(10, Ordering::SeqCst);
        }));

        source.cancel(first);
        source.cancel(first);
        assert_eq!(source.pending(), 1);

        source.fire_all(Duration::ZERO);
        assert_eq!(calls.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn test_callback_receives_budget() {
        let source = ManualIdleSource::new();
        let seen = Arc::new(Mutex::new(None));
        let s = Arc::clone(&seen);
        source.request(Box::new(move |d: &dyn IdleDeadline| {
            *s.lock() = Some((d.time_remaining(), d.did_timeout()));
        }));
        source.fire_next(Duration::from_millis(7));
        assert_eq!(*seen.lock(), Some((Duration::from_millis(7), false)));
    }

    #[test]
    fn test_instant_deadline_counts_down() {
        let deadline = InstantDeadline::new(Duration::from_millis(20));
        assert!(deadline.time_remaining() <= Duration::from_millis(20));
        std::thread::sleep(Duration::from_millis(25));
        assert_eq!(deadline.time_remaining(), Duration::ZERO);
    }
}
