//! Bridges host "about to vanish" signals into synchronous flushes.

use std::fmt;
use std::sync::{Arc, Weak};

use tracing::{debug, info};

use crate::config::UnloadFallback;
use crate::core::host::{Environment, LifecycleEvent, ListenerId, Visibility};

/// Flush invoked by lifecycle listeners. Must run to completion before
/// returning; the host may stop executing right after.
pub type FlushHook = Arc<dyn Fn() + Send + Sync + 'static>;

/// Set of listeners installed on an [`Environment`].
///
/// Listeners are removed when the monitor is dropped, including while
/// unwinding from a panicking flush.
pub struct LifecycleMonitor {
    environment: Arc<dyn Environment>,
    listeners: Vec<ListenerId>,
}

impl LifecycleMonitor {
    /// Subscribe `flush` to the visibility-change signal and, when
    /// `fallback` applies to the environment's platform, to the
    /// unload-imminent signal.
    pub fn install(
        environment: &Arc<dyn Environment>,
        fallback: &UnloadFallback,
        flush: FlushHook,
    ) -> Self {
        // Listeners live inside the environment, so they only hold a weak ref to it.
        let weak_env: Weak<dyn Environment> = Arc::downgrade(environment);
        let mut listeners = Vec::with_capacity(2);

        let on_hidden = Arc::clone(&flush);
        listeners.push(environment.subscribe(
            LifecycleEvent::VisibilityChange,
            Arc::new(move |_event| {
                let Some(env) = weak_env.upgrade() else {
                    return;
                };
                if env.visibility() == Visibility::Hidden {
                    info!("host hidden, flushing idle queue");
                    on_hidden();
                }
            }),
        ));

        let platform = environment.platform();
        if fallback.applies_to(platform.as_deref()) {
            listeners.push(environment.subscribe(
                LifecycleEvent::UnloadImminent,
                Arc::new(move |_event| {
                    info!("host unloading, flushing idle queue");
                    flush();
                }),
            ));
        }

        debug!(
            listeners = listeners.len(),
            platform = platform.as_deref().unwrap_or("unknown"),
            "lifecycle hooks installed"
        );

        Self {
            environment: Arc::clone(environment),
            listeners,
        }
    }

    /// Number of installed listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Remove all listeners.
    pub fn remove(self) {
        drop(self);
    }
}

impl Drop for LifecycleMonitor {
    fn drop(&mut self) {
        for id in self.listeners.drain(..) {
            self.environment.unsubscribe(id);
        }
        debug!("lifecycle hooks removed");
    }
}

impl fmt::Debug for LifecycleMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleMonitor")
            .field("listeners", &self.listeners)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::environment::ManualEnvironment;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_hook() -> (FlushHook, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        (Arc::new(move || { c.fetch_add(1, Ordering::SeqCst); }), count)
    }

    #[test]
    fn test_flushes_only_when_hidden() {
        let env = Arc::new(ManualEnvironment::new());
        let dyn_env: Arc<dyn Environment> = env.clone();
        let (hook, count) = counting_hook();
        let _monitor = LifecycleMonitor::install(&dyn_env, &UnloadFallback::Never, hook);

        env.set_visibility(Visibility::Visible);
        assert_eq!(count.load(Ordering::SeqCst), 0);

        env.set_visibility(Visibility::Hidden);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unload_listener_follows_platform_list() {
        let env = Arc::new(ManualEnvironment::with_platform("safari"));
        let dyn_env: Arc<dyn Environment> = env.clone();
        let (hook, count) = counting_hook();
        let monitor = LifecycleMonitor::install(
            &dyn_env,
            &UnloadFallback::Platforms(vec!["Safari".into()]),
            hook,
        );
        assert_eq!(monitor.listener_count(), 2);

        env.dispatch(LifecycleEvent::UnloadImminent);
        assert_eq!(count.load(Ordering::SeqCst), 1);

        let other = Arc::new(ManualEnvironment::with_platform("firefox"));
        let other_dyn: Arc<dyn Environment> = other.clone();
        let (hook, _) = counting_hook();
        let monitor = LifecycleMonitor::install(
            &other_dyn,
            &UnloadFallback::Platforms(vec!["safari".into()]),
            hook,
        );
        assert_eq!(monitor.listener_count(), 1);
    }

    #[test]
    fn test_drop_unsubscribes() {
        let env = Arc::new(ManualEnvironment::new());
        let dyn_env: Arc<dyn Environment> = env.clone();
        let (hook, count) = counting_hook();
        let monitor = LifecycleMonitor::install(&dyn_env, &UnloadFallback::Always, hook);
        assert_eq!(env.listener_count(), 2);

        monitor.remove();
        assert_eq!(env.listener_count(), 0);

        env.set_visibility(Visibility::Hidden);
        env.dispatch(LifecycleEvent::UnloadImminent);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
