//! Values initialised during idle time, or on first read if that comes first.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::thread::{self, ThreadId};

use parking_lot::{Condvar, Mutex};
use tracing::trace;

use crate::core::host::{DeadlineSource, IdleDeadline, IdleHandle};

type Init<T> = Box<dyn FnOnce() -> T + Send + 'static>;

enum Slot<T> {
    Pending(Init<T>),
    /// The initialiser is running on this thread.
    Initializing(ThreadId),
    Poisoned,
    Ready(Arc<T>),
}

struct Inner<T> {
    slot: Slot<T>,
    handle: Option<IdleHandle>,
}

struct ValueCell<T> {
    inner: Mutex<Inner<T>>,
    /// Signalled when an initialiser finishes or panics.
    ready: Condvar,
}

impl<T> ValueCell<T> {
    /// Return the value, running the initialiser if it is still pending.
    /// The initialiser runs without the lock held; readers on other threads
    /// wait for it.
    fn force(&self) -> Arc<T> {
        let me = thread::current().id();
        let mut inner = self.inner.lock();
        let init = loop {
            match std::mem::replace(&mut inner.slot, Slot::Initializing(me)) {
                Slot::Pending(init) => break init,
                Slot::Ready(value) => {
                    inner.slot = Slot::Ready(Arc::clone(&value));
                    return value;
                }
                Slot::Poisoned => {
                    inner.slot = Slot::Poisoned;
                    drop(inner);
                    panic!("idle value initialiser panicked");
                }
                Slot::Initializing(owner) => {
                    inner.slot = Slot::Initializing(owner);
                    if owner == me {
                        drop(inner);
                        panic!("idle value read from its own initialiser");
                    }
                    self.ready.wait(&mut inner);
                }
            }
        };
        drop(inner);

        let mut guard = InitGuard {
            cell: self,
            finished: false,
        };
        let value = Arc::new(init());
        guard.finished = true;

        let mut inner = self.inner.lock();
        let value = match &inner.slot {
            // Overwritten by `set` while initialising.
            Slot::Ready(current) => Arc::clone(current),
            _ => {
                inner.slot = Slot::Ready(Arc::clone(&value));
                value
            }
        };
        drop(inner);
        self.ready.notify_all();
        value
    }
}

/// Poisons the cell if the initialiser unwinds.
struct InitGuard<'a, T> {
    cell: &'a ValueCell<T>,
    finished: bool,
}

impl<T> Drop for InitGuard<'_, T> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let mut inner = self.cell.inner.lock();
        if matches!(inner.slot, Slot::Initializing(_)) {
            inner.slot = Slot::Poisoned;
        }
        drop(inner);
        self.cell.ready.notify_all();
    }
}

/// A value whose initialiser runs in the next idle period, or immediately
/// when the value is read before that. The initialiser runs at most once.
///
/// No lock is held while the initialiser or a reader closure runs, so both
/// may read other idle values, and readers may read this one again.
pub struct IdleValue<T> {
    cell: Arc<ValueCell<T>>,
    source: Arc<dyn DeadlineSource>,
}

impl<T: Send + Sync + 'static> IdleValue<T> {
    /// Schedule `init` for the next idle period of `source`.
    pub fn new<F>(init: F, source: Arc<dyn DeadlineSource>) -> Self
    where
        F: FnOnce() -> T + Send + 'static,
    {
        let cell = Arc::new(ValueCell {
            inner: Mutex::new(Inner {
                slot: Slot::Pending(Box::new(init)),
                handle: None,
            }),
            ready: Condvar::new(),
        });

        let weak = Arc::downgrade(&cell);
        let mut inner = cell.inner.lock();
        inner.handle = Some(source.request(Box::new(move |_: &dyn IdleDeadline| {
            if let Some(cell) = weak.upgrade() {
                cell.inner.lock().handle = None;
                cell.force();
                trace!("idle value initialised during idle period");
            }
        })));
        drop(inner);

        Self { cell, source }
    }

    fn cancel_idle_init(&self) {
        let handle = self.cell.inner.lock().handle.take();
        if let Some(handle) = handle {
            self.source.cancel(handle);
        }
    }

    /// Shared handle to the value, initialising it first if needed.
    ///
    /// # Panics
    ///
    /// Panics if the initialiser panicked on an earlier attempt, if it is
    /// called from the initialiser itself, and propagates a panic from the
    /// initialiser.
    #[must_use]
    pub fn shared(&self) -> Arc<T> {
        self.cancel_idle_init();
        self.cell.force()
    }

    /// Run `f` on the value, initialising it first if needed.
    ///
    /// # Panics
    ///
    /// See [`shared`](Self::shared).
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let value = self.shared();
        f(&*value)
    }

    /// Clone of the value, initialising it first if needed.
    ///
    /// # Panics
    ///
    /// See [`shared`](Self::shared).
    #[must_use]
    pub fn get(&self) -> T
    where
        T: Clone,
    {
        (*self.shared()).clone()
    }

    /// Overwrite the value. A pending initialiser is cancelled and never runs;
    /// one already running has its result discarded.
    pub fn set(&self, value: T) {
        self.cancel_idle_init();
        self.cell.inner.lock().slot = Slot::Ready(Arc::new(value));
        self.cell.ready.notify_all();
    }

    /// Whether the value has been initialised or set.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        matches!(self.cell.inner.lock().slot, Slot::Ready(_))
    }
}

impl<T> Drop for IdleValue<T> {
    fn drop(&mut self) {
        let handle = self.cell.inner.lock().handle.take();
        if let Some(handle) = handle {
            self.source.cancel(handle);
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for IdleValue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let guard = self.cell.inner.lock();
        let mut d = f.debug_struct("IdleValue");
        match &guard.slot {
            Slot::Ready(value) => d.field("value", value),
            Slot::Pending(_) => d.field("value", &"<pending>"),
            Slot::Initializing(_) => d.field("value", &"<initializing>"),
            Slot::Poisoned => d.field("value", &"<poisoned>"),
        };
        d.finish()
    }
}

/// Named idle values sharing one idle source.
pub struct IdleProperties<T> {
    source: Arc<dyn DeadlineSource>,
    values: BTreeMap<String, IdleValue<T>>,
}

impl<T: Send + Sync + 'static> IdleProperties<T> {
    /// Empty registry on `source`.
    #[must_use]
    pub fn new(source: Arc<dyn DeadlineSource>) -> Self {
        Self {
            source,
            values: BTreeMap::new(),
        }
    }

    /// Define (or redefine) `name` with an idle initialiser.
    pub fn define<F>(&mut self, name: impl Into<String>, init: F)
    where
        F: FnOnce() -> T + Send + 'static,
    {
        let value = IdleValue::new(init, Arc::clone(&self.source));
        self.values.insert(name.into(), value);
    }

    /// Define several properties at once.
    pub fn define_all<I, K, F>(&mut self, props: I)
    where
        I: IntoIterator<Item = (K, F)>,
        K: Into<String>,
        F: FnOnce() -> T + Send + 'static,
    {
        for (name, init) in props {
            self.define(name, init);
        }
    }

    /// Clone of the value of `name`, if defined.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<T>
    where
        T: Clone,
    {
        self.values.get(name).map(IdleValue::get)
    }

    /// Run `f` on the value of `name`, if defined.
    pub fn with<R>(&self, name: &str, f: impl FnOnce(&T) -> R) -> Option<R> {
        self.values.get(name).map(|value| value.with(f))
    }

    /// Overwrite `name`. Returns false if it is not defined.
    pub fn set(&self, name: &str, value: T) -> bool {
        self.values.get(name).is_some_and(|slot| {
            slot.set(value);
            true
        })
    }

    /// Whether `name` is defined.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Defined names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Number of defined properties.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether no property is defined.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
