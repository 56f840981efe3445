//! Host contracts the queue is built on.
//!
//! The queue never talks to a concrete event loop. It is handed three
//! collaborators:
//!
//! - a [`DeadlineSource`] granting idle periods with a remaining-time budget,
//! - a [`MicrotaskSource`] used for urgent flushes while the host is hidden,
//! - an [`Environment`] reporting visibility and lifecycle signals.
//!
//! Implementations must never invoke a callback before the call that
//! registered it has returned. The queue holds its internal lock while it
//! requests an idle period, so a synchronous callback would deadlock.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Time budget handed to an idle callback.
pub trait IdleDeadline {
    /// Estimated time left in the current idle period.
    fn time_remaining(&self) -> Duration;

    /// Whether the callback fired because a timeout elapsed rather than
    /// because the host went idle.
    fn did_timeout(&self) -> bool {
        false
    }
}

/// Callback invoked when an idle period is granted.
pub type IdleCallback = Box<dyn FnOnce(&dyn IdleDeadline) + Send + 'static>;

/// Callback invoked at the next microtask boundary.
pub type Microtask = Box<dyn FnOnce() + Send + 'static>;

/// Opaque handle for a pending idle request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IdleHandle(u64);

impl IdleHandle {
    /// Wrap a source-specific identifier.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Source-specific identifier.
    #[must_use]
    pub const fn id(self) -> u64 {
        self.0
    }
}

impl fmt::Display for IdleHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "idle#{}", self.0)
    }
}

/// Grants idle periods ("request idle callback").
pub trait DeadlineSource: Send + Sync {
    /// Schedule `callback` for the next idle period.
    fn request(&self, callback: IdleCallback) -> IdleHandle;

    /// Cancel a pending request. Cancelling a handle that already fired or
    /// was already cancelled does nothing.
    fn cancel(&self, handle: IdleHandle);
}

/// Runs callbacks at the next microtask boundary. No cancellation.
pub trait MicrotaskSource: Send + Sync {
    /// Queue `microtask`.
    fn schedule(&self, microtask: Microtask);
}

/// Host visibility state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    /// The host is in the foreground.
    #[default]
    Visible,
    /// The host is backgrounded and may be torn down without notice.
    Hidden,
}

/// Lifecycle signals an [`Environment`] can deliver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleEvent {
    /// Visibility changed; query [`Environment::visibility`] for the new state.
    VisibilityChange,
    /// The host is about to unload. Listeners must finish synchronously.
    UnloadImminent,
}

/// Listener registered with an [`Environment`].
pub type LifecycleListener = Arc<dyn Fn(LifecycleEvent) + Send + Sync + 'static>;

/// Identifier returned by [`Environment::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    /// Wrap an environment-specific identifier.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Environment-specific identifier.
    #[must_use]
    pub const fn id(self) -> u64 {
        self.0
    }
}

/// Narrow view of the host environment.
pub trait Environment: Send + Sync {
    /// Current visibility.
    fn visibility(&self) -> Visibility;

    /// Register `listener` for `event`.
    fn subscribe(&self, event: LifecycleEvent, listener: LifecycleListener) -> ListenerId;

    /// Remove a listener. Unknown ids are ignored.
    fn unsubscribe(&self, id: ListenerId);

    /// Platform identifier, matched against
    /// [`UnloadFallback::Platforms`](crate::config::UnloadFallback::Platforms).
    fn platform(&self) -> Option<String> {
        None
    }
}

/// Returns true if `deadline` exists and reports no more than
/// `min_task_time` remaining. Without a deadline the drain never yields.
#[must_use]
pub fn should_yield(deadline: Option<&dyn IdleDeadline>, min_task_time: Duration) -> bool {
    deadline.is_some_and(|d| d.time_remaining() <= min_task_time)
}
