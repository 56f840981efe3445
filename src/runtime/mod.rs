//! Runtime-backed host adapters.

#[cfg(feature = "tokio-runtime")]
pub mod tokio_idle;

#[cfg(feature = "tokio-runtime")]
pub use tokio_idle::TokioIdleSource;
