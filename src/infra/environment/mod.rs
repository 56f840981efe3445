//! Host environments.

pub mod memory;

pub use memory::{AlwaysVisible, ManualEnvironment};
