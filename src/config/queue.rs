//! Idle queue configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::SchedulerError;

/// When to flush on the unload-imminent signal.
///
/// Some hosts do not reliably report "hidden" before tearing down, so the
/// queue can additionally listen for the unload signal. Listening has a cost
/// on hosts that disable page caching for unload listeners, which is why this
/// is opt-in per platform.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnloadFallback {
    /// Rely on visibility changes only.
    #[default]
    Never,
    /// Always listen for the unload signal.
    Always,
    /// Listen only when [`Environment::platform`](crate::core::Environment::platform)
    /// matches one of these names (case-insensitive).
    Platforms(Vec<String>),
}

impl UnloadFallback {
    /// Whether the unload listener applies to `platform`.
    #[must_use]
    pub fn applies_to(&self, platform: Option<&str>) -> bool {
        match self {
            Self::Never => false,
            Self::Always => true,
            Self::Platforms(names) => platform
                .is_some_and(|p| names.iter().any(|name| name.eq_ignore_ascii_case(p))),
        }
    }
}

/// Queue configuration. Immutable once the queue is built.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IdleQueueConfig {
    /// Install lifecycle hooks and prefer microtask delivery while hidden.
    pub ensure_tasks_run: bool,
    /// Fallback minimum task time in milliseconds.
    pub default_min_task_time_ms: u64,
    /// Unload-imminent fallback policy. Only used with `ensure_tasks_run`.
    pub unload_fallback: UnloadFallback,
}

impl IdleQueueConfig {
    /// Default configuration: no lifecycle hooks, zero minimum task time.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `ensure_tasks_run`.
    #[must_use]
    pub const fn with_ensure_tasks_run(mut self, ensure_tasks_run: bool) -> Self {
        self.ensure_tasks_run = ensure_tasks_run;
        self
    }

    /// Set the default minimum task time.
    #[must_use]
    pub fn with_default_min_task_time(mut self, min_task_time: Duration) -> Self {
        self.default_min_task_time_ms = u64::try_from(min_task_time.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Set the unload fallback policy.
    #[must_use]
    pub fn with_unload_fallback(mut self, unload_fallback: UnloadFallback) -> Self {
        self.unload_fallback = unload_fallback;
        self
    }

    /// Default minimum task time as a [`Duration`].
    #[must_use]
    pub const fn default_min_task_time(&self) -> Duration {
        Duration::from_millis(self.default_min_task_time_ms)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        if let UnloadFallback::Platforms(names) = &self.unload_fallback {
            if names.is_empty() {
                return Err("unload_fallback platforms must not be empty".into());
            }
            if names.iter().any(|name| name.trim().is_empty()) {
                return Err("unload_fallback platform names must not be blank".into());
            }
        }
        Ok(())
    }

    /// Parse configuration from a JSON string and validate.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Parse`] for malformed JSON and
    /// [`SchedulerError::InvalidConfig`] when validation fails.
    pub fn from_json_str(input: &str) -> Result<Self, SchedulerError> {
        let cfg: Self = serde_json::from_str(input)?;
        cfg.validate().map_err(SchedulerError::InvalidConfig)?;
        Ok(cfg)
    }
}
