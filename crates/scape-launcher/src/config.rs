//! Persisted server configuration and the tick-statistics artifact
//!
//! The simulation server keeps a JSON configuration file next to its
//! working directory. Only two keys matter here (the tick interval and
//! the artifact path), but the file belongs to the server, so every other
//! key must survive a rewrite untouched.

use scape_rl_core::{Result, ScapeRLError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

fn default_cycle_time_ms() -> u64 {
    600
}

fn default_tick_report_file() -> String {
    "data/rl_tick.json".to_string()
}

/// The simulation server's persisted configuration record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Tick interval in milliseconds
    #[serde(default = "default_cycle_time_ms")]
    pub cycle_time_ms: u64,

    /// Path of the tick-statistics artifact, relative to the server dir
    #[serde(default = "default_tick_report_file")]
    pub rl_tick_report_file: String,

    /// Every other key, preserved verbatim across rewrites
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl ServerConfig {
    pub async fn load(path: &Path) -> Result<Self> {
        let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
            ScapeRLError::Launch(format!("failed to read config {}: {e}", path.display()))
        })?;
        serde_json::from_str(&raw).map_err(|e| {
            ScapeRLError::Launch(format!("bad config {}: {e}", path.display()))
        })
    }

    pub async fn store(&self, path: &Path) -> Result<()> {
        let raw = serde_json::to_string_pretty(self)
            .map_err(|e| ScapeRLError::Launch(format!("failed to encode config: {e}")))?;
        tokio::fs::write(path, raw).await.map_err(|e| {
            ScapeRLError::Launch(format!("failed to write config {}: {e}", path.display()))
        })
    }
}

/// Tick statistics the simulation writes on its own; read-only here.
///
/// A missing `avg_ms` means the server never measured a full window, which
/// can never count as stable.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TickStats {
    /// Ticks that took longer than their allotted interval
    #[serde(default)]
    pub overruns: u64,

    /// Average tick duration in milliseconds
    #[serde(default)]
    pub avg_ms: Option<f64>,
}

/// Read the artifact if it exists and parses; anything else is `None`.
pub async fn read_tick_stats(path: &Path) -> Option<TickStats> {
    let raw = tokio::fs::read_to_string(path).await.ok()?;
    serde_json::from_str(&raw).ok()
}
