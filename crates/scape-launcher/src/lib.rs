//! Process supervision for the scape-rl simulation
//!
//! This crate provides:
//! - The persisted server configuration record and the tick-statistics
//!   artifact the simulation writes (`config`)
//! - The tick-interval auto-tune search (`tune`)
//! - The supervisor that builds, starts and stops the simulation
//!   processes (`launcher`)

pub mod config;
pub mod launcher;
pub mod tune;

pub use config::{ServerConfig, TickStats, read_tick_stats};
pub use launcher::{Launcher, LauncherConfig};
pub use tune::{TickProbe, TuneConfig, TuneOutcome, TuneResult};
