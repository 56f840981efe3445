//! Component-level tests, one module per area.

mod unit;
