//! Tick-synchronized environment for scape-rl
//!
//! This crate provides:
//! - The tick sync engine: one simulation tick of progress per step, with
//!   online recalibration of the tick divisor (`sync`)
//! - The environment layer consuming the bridge through `reset`/`step`
//!   (`env`)

pub mod env;
pub mod sync;

pub use env::{EnvConfig, RewardBreakdown, RewardConfig, ScapeEnv, StepOutcome};
pub use sync::{TickSource, TickSync, TickSyncConfig};
