//! In-memory environments.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tracing::debug;

use crate::core::host::{Environment, LifecycleEvent, LifecycleListener, ListenerId, Visibility};

/// Environment that is always visible and never signals. Default for
/// native hosts with no notion of backgrounding.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysVisible;

impl Environment for AlwaysVisible {
    fn visibility(&self) -> Visibility {
        Visibility::Visible
    }

    fn subscribe(&self, _event: LifecycleEvent, _listener: LifecycleListener) -> ListenerId {
        ListenerId::new(0)
    }

    fn unsubscribe(&self, _id: ListenerId) {}
}

/// Environment whose visibility and lifecycle signals are driven by the
/// caller. Listeners run synchronously on the dispatching thread.
pub struct ManualEnvironment {
    visibility: Mutex<Visibility>,
    listeners: Mutex<Vec<(ListenerId, LifecycleEvent, LifecycleListener)>>,
    next_id: AtomicU64,
    platform: Option<String>,
}

impl ManualEnvironment {
    /// Visible environment with no platform name.
    #[must_use]
    pub fn new() -> Self {
        Self {
            visibility: Mutex::new(Visibility::Visible),
            listeners: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            platform: None,
        }
    }

    /// Visible environment reporting `platform`.
    #[must_use]
    pub fn with_platform(platform: impl Into<String>) -> Self {
        Self {
            platform: Some(platform.into()),
            ..Self::new()
        }
    }

    /// Change visibility and notify `VisibilityChange` listeners if it
    /// actually changed.
    pub fn set_visibility(&self, visibility: Visibility) {
        let changed = {
            let mut current = self.visibility.lock();
            let changed = *current != visibility;
            *current = visibility;
            changed
        };
        if changed {
            debug!(?visibility, "visibility changed");
            self.dispatch(LifecycleEvent::VisibilityChange);
        }
    }

    /// Change visibility without notifying anyone.
    pub fn set_visibility_silently(&self, visibility: Visibility) {
        *self.visibility.lock() = visibility;
    }

    /// Deliver `event` to its listeners, in subscription order.
    pub fn dispatch(&self, event: LifecycleEvent) {
        // Listeners may unsubscribe while running.
        let targets: Vec<LifecycleListener> = self
            .listeners
            .lock()
            .iter()
            .filter(|(_, e, _)| *e == event)
            .map(|(_, _, listener)| std::sync::Arc::clone(listener))
            .collect();
        for listener in targets {
            listener(event);
        }
    }

    /// Number of registered listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }
}

impl Default for ManualEnvironment {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment for ManualEnvironment {
    fn visibility(&self) -> Visibility {
        *self.visibility.lock()
    }

    fn subscribe(&self, event: LifecycleEvent, listener: LifecycleListener) -> ListenerId {
        let id = ListenerId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.lock().push((id, event, listener));
        id
    }

    fn unsubscribe(&self, id: ListenerId) {
        self.listeners.lock().retain(|(existing, _, _)| *existing != id);
    }

    fn platform(&self) -> Option<String> {
        self.platform.clone()
    }
}
