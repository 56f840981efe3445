//! Dedicated host thread approximating idle callbacks and microtasks.
//!
//! Hosts without a native idle-callback primitive get a timer-style
//! approximation: every request is granted a fixed budget on a background
//! thread, one at a time, in request order. Microtasks are drained before
//! each idle period, so an urgent flush never waits behind idle work.
//!
//! # Design
//!
//! - **No polling**: the host thread blocks on `crossbeam_channel::select!`
//! - **Cancellation**: a request only fires if its handle is still in the
//!   pending set when the thread picks it up
//! - **Panic isolation**: a panicking callback is logged and the thread keeps
//!   serving; the queue has already rescheduled its remaining work

use std::collections::HashSet;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;

use crossbeam_channel::{select, unbounded, Receiver, Sender};
use parking_lot::Mutex;
use tracing::{debug, error, trace, warn};

use crate::core::host::{
    DeadlineSource, IdleCallback, IdleDeadline, IdleHandle, Microtask, MicrotaskSource,
};
use crate::core::SchedulerError;

use super::memory::{InstantDeadline, MAX_IDLE_PERIOD};

type IdleRequest = (IdleHandle, IdleCallback);

/// Background thread serving idle periods and microtasks.
pub struct ThreadIdleHost {
    idle_tx: Mutex<Option<Sender<IdleRequest>>>,
    microtask_tx: Mutex<Option<Sender<Microtask>>>,
    pending: Arc<Mutex<HashSet<IdleHandle>>>,
    next_id: AtomicU64,
    worker: Mutex<Option<JoinHandle<()>>>,
    worker_id: ThreadId,
    budget: Duration,
}

impl ThreadIdleHost {
    /// Start a host thread granting [`MAX_IDLE_PERIOD`] per idle period.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Spawn`] if the thread cannot be started.
    pub fn new() -> Result<Self, SchedulerError> {
        Self::with_budget(MAX_IDLE_PERIOD)
    }

    /// Start a host thread granting `budget` per idle period.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Spawn`] if the thread cannot be started.
    pub fn with_budget(budget: Duration) -> Result<Self, SchedulerError> {
        let (idle_tx, idle_rx) = unbounded();
        let (microtask_tx, microtask_rx) = unbounded();
        let pending = Arc::new(Mutex::new(HashSet::new()));

        let worker_pending = Arc::clone(&pending);
        let worker = thread::Builder::new()
            .name("idle-host".into())
            .spawn(move || host_loop(&idle_rx, &microtask_rx, &worker_pending, budget))?;
        let worker_id = worker.thread().id();
        debug!(?budget, "idle host thread started");

        Ok(Self {
            idle_tx: Mutex::new(Some(idle_tx)),
            microtask_tx: Mutex::new(Some(microtask_tx)),
            pending,
            next_id: AtomicU64::new(1),
            worker: Mutex::new(Some(worker)),
            worker_id,
            budget,
        })
    }

    /// Budget granted per idle period.
    #[must_use]
    pub const fn budget(&self) -> Duration {
        self.budget
    }

    /// Number of idle requests not yet fired or cancelled.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.lock().len()
    }

    /// Whether the host still accepts callbacks.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.idle_tx.lock().is_some()
    }

    /// Stop the host thread. Requests not yet fired are dropped.
    pub fn shutdown(&self) {
        // Dropping the senders ends the host loop.
        drop(self.idle_tx.lock().take());
        drop(self.microtask_tx.lock().take());
        self.pending.lock().clear();

        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            // The last handle may be released by a callback on the host thread itself.
            if thread::current().id() == self.worker_id {
                return;
            }
            if worker.join().is_err() {
                error!("idle host thread panicked");
            }
        }
    }
}

fn host_loop(
    idle_rx: &Receiver<IdleRequest>,
    microtask_rx: &Receiver<Microtask>,
    pending: &Mutex<HashSet<IdleHandle>>,
    budget: Duration,
) {
    loop {
        drain_microtasks(microtask_rx);
        let keep_running = select! {
            recv(microtask_rx) -> msg => match msg {
                Ok(microtask) => {
                    run_guarded("microtask", microtask);
                    true
                }
                Err(_) => false,
            },
            recv(idle_rx) -> msg => match msg {
                Ok((handle, callback)) => {
                    if pending.lock().remove(&handle) {
                        drain_microtasks(microtask_rx);
                        let deadline = InstantDeadline::new(budget);
                        run_guarded("idle callback", move || callback(&deadline as &dyn IdleDeadline));
                    } else {
                        trace!(%handle, "skipping cancelled idle request");
                    }
                    true
                }
                Err(_) => false,
            },
        };
        if !keep_running {
            break;
        }
    }
    debug!("idle host thread stopped");
}

fn drain_microtasks(microtask_rx: &Receiver<Microtask>) {
    while let Ok(microtask) = microtask_rx.try_recv() {
        run_guarded("microtask", microtask);
    }
}

fn run_guarded(kind: &str, f: impl FnOnce()) {
    if catch_unwind(AssertUnwindSafe(f)).is_err() {
        error!(kind, "callback panicked on idle host thread");
    }
}

impl DeadlineSource for ThreadIdleHost {
    fn request(&self, callback: IdleCallback) -> IdleHandle {
        let handle = IdleHandle::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let tx = self.idle_tx.lock();
        match tx.as_ref() {
            Some(tx) => {
                self.pending.lock().insert(handle);
                if tx.send((handle, callback)).is_err() {
                    self.pending.lock().remove(&handle);
                    warn!(%handle, "idle host stopped, request dropped");
                }
            }
            None => warn!(%handle, "idle host shut down, request dropped"),
        }
        handle
    }

    fn cancel(&self, handle: IdleHandle) {
        self.pending.lock().remove(&handle);
    }
}

impl MicrotaskSource for ThreadIdleHost {
    fn schedule(&self, microtask: Microtask) {
        let tx = self.microtask_tx.lock();
        let sent = tx.as_ref().is_some_and(|tx| tx.send(microtask).is_ok());
        if !sent {
            warn!("idle host shut down, microtask dropped");
        }
    }
}

impl Drop for ThreadIdleHost {
    fn drop(&mut self) {
        self.shutdown();
    }
}
