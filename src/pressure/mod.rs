//! Memory Pressure Module
//!
//! Lets the host platform ask caches to drop their contents when the
//! process should reduce memory usage.
//!
//! # Components
//! - Source: where the platform reports pressure signals
//! - Trigger: per-cache background task reacting to those signals

mod source;
mod trigger;

pub use source::{MemoryPressureSource, PressureLevel, PressureMask};
pub use trigger::{MemoryPressureTrigger, TriggerState};
