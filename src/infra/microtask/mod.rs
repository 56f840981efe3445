//! Microtask sources.

pub mod memory;

pub use memory::MicrotaskQueue;
