//! Host adapters: idle sources, microtask queues and environments.

pub mod environment;
pub mod idle;
pub mod microtask;
