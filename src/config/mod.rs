//! Configuration models for idle queues.

pub mod queue;

pub use queue::{IdleQueueConfig, UnloadFallback};
