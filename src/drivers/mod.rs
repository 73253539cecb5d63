//! Peripheral helpers and execution-unit spawning.

pub mod button;
pub mod task_pin;
