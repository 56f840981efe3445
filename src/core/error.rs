//! Error types for scheduler construction and host adapters.

use thiserror::Error;

/// Errors produced while building a queue or one of its host adapters.
///
/// Queue operations themselves never fail: a task that panics propagates
/// its panic to whoever drove the drain, and operations on a destroyed
/// queue are no-ops.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Configuration failed validation.
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    /// Configuration could not be parsed.
    #[error("parse error: {0}")]
    Parse(#[from] serde_json::Error),
    /// A host thread or runtime could not be started.
    #[error("spawn failed: {0}")]
    Spawn(#[from] std::io::Error),
}
