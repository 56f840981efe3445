//! Idle period sources.

pub mod memory;
#[cfg(not(target_arch = "wasm32"))]
pub mod thread;

pub use memory::{FixedDeadline, InstantDeadline, ManualIdleSource, MAX_IDLE_PERIOD};
#[cfg(not(target_arch = "wasm32"))]
pub use thread::ThreadIdleHost;
