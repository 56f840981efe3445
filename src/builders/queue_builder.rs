//! Builders to construct idle queues from configuration.

use std::sync::Arc;

use tracing::debug;

use crate::config::IdleQueueConfig;
use crate::core::{DeadlineSource, Environment, IdleQueue, MicrotaskSource, SchedulerError};
use crate::infra::environment::AlwaysVisible;

/// Validate `cfg` and build a queue on the given host sources.
///
/// # Errors
///
/// Returns [`SchedulerError::InvalidConfig`] if validation fails.
pub fn build_queue(
    cfg: &IdleQueueConfig,
    idle: Arc<dyn DeadlineSource>,
    microtasks: Arc<dyn MicrotaskSource>,
    environment: Arc<dyn Environment>,
) -> Result<IdleQueue, SchedulerError> {
    cfg.validate()
        .map_err(|e| SchedulerError::InvalidConfig(format!("config invalid: {e}")))?;
    Ok(IdleQueue::new(cfg.clone(), idle, microtasks, environment))
}

/// Step-by-step construction of an [`IdleQueue`].
///
/// Sources left unset fall back to a [`ThreadIdleHost`](crate::infra::idle::ThreadIdleHost)
/// serving both idle periods and microtasks, and an [`AlwaysVisible`]
/// environment.
pub struct IdleQueueBuilder {
    config: IdleQueueConfig,
    idle: Option<Arc<dyn DeadlineSource>>,
    microtasks: Option<Arc<dyn MicrotaskSource>>,
    environment: Option<Arc<dyn Environment>>,
}

impl IdleQueueBuilder {
    /// Start from `config`.
    #[must_use]
    pub fn new(config: IdleQueueConfig) -> Self {
        Self {
            config,
            idle: None,
            microtasks: None,
            environment: None,
        }
    }

    /// Start from a JSON configuration.
    ///
    /// # Errors
    ///
    /// See [`IdleQueueConfig::from_json_str`].
    pub fn from_json_str(input: &str) -> Result<Self, SchedulerError> {
        Ok(Self::new(IdleQueueConfig::from_json_str(input)?))
    }

    /// Use `idle` for idle periods.
    #[must_use]
    pub fn idle_source(mut self, idle: Arc<dyn DeadlineSource>) -> Self {
        self.idle = Some(idle);
        self
    }

    /// Use `microtasks` for urgent flushes.
    #[must_use]
    pub fn microtask_source(mut self, microtasks: Arc<dyn MicrotaskSource>) -> Self {
        self.microtasks = Some(microtasks);
        self
    }

    /// Use one host for both idle periods and microtasks.
    #[must_use]
    pub fn host<H>(self, host: Arc<H>) -> Self
    where
        H: DeadlineSource + MicrotaskSource + 'static,
    {
        let microtasks: Arc<dyn MicrotaskSource> = host.clone();
        self.idle_source(host).microtask_source(microtasks)
    }

    /// Use `environment` for visibility and lifecycle signals.
    #[must_use]
    pub fn environment(mut self, environment: Arc<dyn Environment>) -> Self {
        self.environment = Some(environment);
        self
    }

    /// Validate the configuration and build the queue.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::InvalidConfig`] if validation fails and
    /// [`SchedulerError::Spawn`] if a default host thread cannot be started.
    pub fn build(self) -> Result<IdleQueue, SchedulerError> {
        let (idle, microtasks) = match (self.idle, self.microtasks) {
            (Some(idle), Some(microtasks)) => (idle, microtasks),
            (idle, microtasks) => {
                let host = default_host()?;
                debug!("using default idle host");
                (
                    idle.unwrap_or_else(|| host.0.clone()),
                    microtasks.unwrap_or(host.1),
                )
            }
        };
        let environment = self
            .environment
            .unwrap_or_else(|| Arc::new(AlwaysVisible));
        build_queue(&self.config, idle, microtasks, environment)
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn default_host() -> Result<(Arc<dyn DeadlineSource>, Arc<dyn MicrotaskSource>), SchedulerError> {
    let host = Arc::new(crate::infra::idle::ThreadIdleHost::new()?);
    let idle: Arc<dyn DeadlineSource> = host.clone();
    let microtasks: Arc<dyn MicrotaskSource> = host;
    Ok((idle, microtasks))
}

#[cfg(target_arch = "wasm32")]
fn default_host() -> Result<(Arc<dyn DeadlineSource>, Arc<dyn MicrotaskSource>), SchedulerError> {
    Err(SchedulerError::InvalidConfig(
        "idle and microtask sources must be provided on wasm32".into(),
    ))
}
