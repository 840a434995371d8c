//! Tick-interval auto-tune search
//!
//! Empirically finds the fastest tick interval the simulation can sustain
//! without overruns. Candidates are probed in ascending order and the
//! first stable one wins: a monotonic linear search, because faster
//! intervals are strictly preferred and skipping ahead could land on an
//! interval whose instability the coarser probe would have revealed.

use crate::config::TickStats;
use async_trait::async_trait;
use scape_rl_core::{Result, ScapeRLError};
use std::time::Duration;
use tracing::{info, warn};

/// Auto-tune policy. The candidate list and acceptance ratio are
/// empirical constants, not laws; override them as needed.
#[derive(Debug, Clone)]
pub struct TuneConfig {
    /// Candidate tick intervals in milliseconds, ascending
    pub candidates: Vec<u64>,
    /// Artifact poll cadence while a candidate runs
    pub poll_interval: Duration,
    /// How long to wait for the artifact per candidate
    pub timeout: Duration,
    /// A candidate is stable when avg tick time <= candidate * ratio
    pub avg_ratio: f64,
}

impl Default for TuneConfig {
    fn default() -> Self {
        Self {
            candidates: vec![60, 80, 100, 120, 150, 200, 300, 400, 600],
            poll_interval: Duration::from_millis(200),
            timeout: Duration::from_secs(8),
            avg_ratio: 0.9,
        }
    }
}

/// Observation for one probed candidate
#[derive(Debug, Clone)]
pub struct TuneResult {
    pub interval_ms: u64,
    pub avg_ms: Option<f64>,
    pub overruns: u64,
}

/// Outcome of the search
#[derive(Debug, Clone)]
pub struct TuneOutcome {
    /// The interval to persist
    pub chosen_ms: u64,
    /// Per-candidate observations, in probe order
    pub results: Vec<TuneResult>,
}

/// Runs the simulation at a candidate interval and reports its tick
/// statistics. `None` means the artifact never appeared.
#[async_trait]
pub trait TickProbe: Send {
    async fn sample(&mut self, interval_ms: u64) -> Result<Option<TickStats>>;
}

/// Whether a candidate interval proved stable
pub fn is_stable(interval_ms: u64, stats: &TickStats, avg_ratio: f64) -> bool {
    stats.overruns == 0
        && stats
            .avg_ms
            .is_some_and(|avg| avg <= interval_ms as f64 * avg_ratio)
}

/// Probe candidates in ascending order; first stable wins, the last
/// (slowest) candidate is the fallback when none is.
pub async fn run<P: TickProbe>(config: &TuneConfig, probe: &mut P) -> Result<TuneOutcome> {
    let fallback = *config
        .candidates
        .last()
        .ok_or_else(|| ScapeRLError::Launch("auto-tune candidate list is empty".into()))?;

    let mut results = Vec::new();
    for &interval_ms in &config.candidates {
        info!("auto-tune: testing {interval_ms}ms tick interval");
        let stats = match probe.sample(interval_ms).await? {
            Some(stats) => stats,
            None => {
                warn!("auto-tune: no tick stats at {interval_ms}ms, skipping");
                continue;
            }
        };

        results.push(TuneResult {
            interval_ms,
            avg_ms: stats.avg_ms,
            overruns: stats.overruns,
        });

        if is_stable(interval_ms, &stats, config.avg_ratio) {
            info!(
                "auto-tune: stable at {interval_ms}ms (avg {:?}ms)",
                stats.avg_ms
            );
            return Ok(TuneOutcome {
                chosen_ms: interval_ms,
                results,
            });
        }
        info!(
            "auto-tune: unstable at {interval_ms}ms (avg {:?}ms, overruns {})",
            stats.avg_ms, stats.overruns
        );
    }

    warn!("auto-tune: no stable interval, falling back to {fallback}ms");
    Ok(TuneOutcome {
        chosen_ms: fallback,
        results,
    })
}
