//! Tick alignment and divisor calibration
//!
//! The simulation renders faster than it ticks, and its tick rate can
//! change at runtime. `TickSync` converts the raw tick counter into
//! aligned ticks through an integer divisor, and guarantees that one step
//! observes exactly one aligned tick of progress: the step loop keeps
//! advancing render cycles until the first tick boundary is crossed, then
//! stops.
//!
//! A frozen simulation blocks the aligned loop indefinitely. That is
//! intentional: a step timeout aggressive enough to matter would also
//! abort valid slow ticks. Callers that need bounded latency should wrap
//! the step in their own watchdog.

use async_trait::async_trait;
use scape_rl_core::{Frame, Result, StateSnapshot};
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tracing::{debug, info};

/// Seconds per aligned tick when neither configuration nor the
/// simulation's own declared cycle time supplies a target
pub const DEFAULT_TARGET_TICK_SECONDS: f64 = 0.6;

/// Where the engine reads tick counters and advances render cycles
#[async_trait]
pub trait TickSource: Send {
    /// Current state snapshot, carrying the raw tick counter
    async fn snapshot(&mut self) -> Result<StateSnapshot>;

    /// Advance at least one render cycle and return the resulting frame
    async fn advance(&mut self) -> Result<Frame>;
}

#[derive(Debug, Clone)]
pub struct TickSyncConfig {
    /// Align steps to simulation ticks; free-running when off
    pub enabled: bool,
    /// Recalibrate the divisor as the session runs
    pub auto_calibrate: bool,
    /// Steps between recalibrations
    pub calibrate_every: u32,
    /// Wall-clock sampling window per calibration
    pub calibrate_window: Duration,
    /// Seconds per aligned tick; derived from the simulation when unset
    pub target_tick_seconds: Option<f64>,
    /// Starting divisor, before any calibration
    pub initial_divisor: u64,
}

impl Default for TickSyncConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            auto_calibrate: true,
            calibrate_every: 5000,
            calibrate_window: Duration::from_millis(1500),
            target_tick_seconds: None,
            initial_divisor: 1,
        }
    }
}

/// The tick sync engine. The divisor is mutated only by `calibrate`; the
/// step path just reads it.
pub struct TickSync {
    config: TickSyncConfig,
    divisor: u64,
    last_tick: Option<u64>,
}

impl TickSync {
    pub fn new(config: TickSyncConfig) -> Self {
        let divisor = config.initial_divisor.max(1);
        Self {
            config,
            divisor,
            last_tick: None,
        }
    }

    pub fn config(&self) -> &TickSyncConfig {
        &self.config
    }

    pub fn enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn divisor(&self) -> u64 {
        self.divisor
    }

    /// Last aligned tick the engine observed
    pub fn last_tick(&self) -> Option<u64> {
        self.last_tick
    }

    /// Map a raw tick counter to an aligned tick
    pub fn aligned(&self, raw_tick: u64) -> u64 {
        raw_tick / self.divisor
    }

    /// Record the aligned tick of a snapshot and return it
    pub fn observe(&mut self, snapshot: &StateSnapshot) -> u64 {
        let tick = self.aligned(snapshot.loop_cycle);
        self.last_tick = Some(tick);
        tick
    }

    /// Read the aligned tick a step starts from, or `None` when
    /// free-running.
    pub async fn begin_step<S: TickSource>(&mut self, source: &mut S) -> Result<Option<u64>> {
        if !self.config.enabled {
            return Ok(None);
        }
        let snapshot = source.snapshot().await?;
        Ok(Some(self.observe(&snapshot)))
    }

    /// Advance render cycles until one aligned tick has elapsed.
    ///
    /// Free-running (`tick_before == None`) issues a single advance. In
    /// aligned mode the loop exits on the first boundary crossed, so the
    /// step observes at least (and effectively exactly) one tick, no
    /// matter how many render cycles that took.
    pub async fn complete_step<S: TickSource>(
        &mut self,
        source: &mut S,
        tick_before: Option<u64>,
    ) -> Result<(Frame, StateSnapshot)> {
        let Some(before) = tick_before else {
            let frame = source.advance().await?;
            let state = source.snapshot().await?;
            return Ok((frame, state));
        };

        loop {
            let frame = source.advance().await?;
            let state = source.snapshot().await?;
            let tick = self.aligned(state.loop_cycle);
            if tick > before {
                debug!("tick {before} -> {tick}");
                self.last_tick = Some(tick);
                return Ok((frame, state));
            }
        }
    }

    /// Whether the periodic recalibration is due after `step_count` steps
    pub fn should_recalibrate(&self, step_count: u32) -> bool {
        self.config.enabled
            && self.config.auto_calibrate
            && self.config.calibrate_every > 0
            && step_count % self.config.calibrate_every == 0
    }

    /// Divisor for an observed cycle rate and a target seconds-per-tick.
    /// The cycle rate is floored at one cycle per second and the divisor
    /// at one.
    pub fn compute_divisor(cycles_per_sec: f64, target_seconds: f64) -> u64 {
        let cycles_per_sec = cycles_per_sec.max(1.0);
        ((cycles_per_sec * target_seconds).round() as u64).max(1)
    }

    /// Measure the raw cycle rate over the calibration window and derive
    /// a fresh divisor for `target_seconds` per aligned tick. Runs only
    /// between steps; a non-positive target leaves the divisor alone.
    pub async fn calibrate<S: TickSource>(
        &mut self,
        source: &mut S,
        target_seconds: f64,
    ) -> Result<()> {
        if !self.config.enabled || target_seconds <= 0.0 {
            return Ok(());
        }

        let started = Instant::now();
        let start_cycle = source.snapshot().await?.loop_cycle;
        sleep(self.config.calibrate_window).await;
        let end_cycle = source.snapshot().await?.loop_cycle;

        let elapsed = started.elapsed().as_secs_f64().max(1e-6);
        let cycles_per_sec = (end_cycle.saturating_sub(start_cycle) as f64 / elapsed).max(1.0);
        let divisor = Self::compute_divisor(cycles_per_sec, target_seconds);

        if divisor != self.divisor {
            info!(
                "tick divisor calibrated to {divisor} (cycles/sec {cycles_per_sec:.2}, target {target_seconds:.3}s)"
            );
            self.divisor = divisor;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scape_rl_core::FrameHeader;

    /// Scripted source: the raw counter bumps once every `every` advances.
    struct ScriptSource {
        cycle: u64,
        advances: u32,
        every: u32,
        /// Overrides the live counter when non-empty (for calibration)
        scripted_cycles: Vec<u64>,
    }

    impl ScriptSource {
        fn every(every: u32) -> Self {
            Self {
                cycle: 100,
                advances: 0,
                every,
                scripted_cycles: Vec::new(),
            }
        }

        fn scripted(cycles: Vec<u64>) -> Self {
            Self {
                cycle: 0,
                advances: 0,
                every: 1,
                scripted_cycles: cycles,
            }
        }

        fn snapshot_at(cycle: u64) -> StateSnapshot {
            StateSnapshot {
                total_xp: 0,
                total_levels: 0,
                hp: 10,
                max_hp: 10,
                anim: -1,
                interacting: -1,
                loop_cycle: cycle,
                skill_index: -1,
                skill_delta: 0,
            }
        }
    }

    #[async_trait]
    impl TickSource for ScriptSource {
        async fn snapshot(&mut self) -> Result<StateSnapshot> {
            let cycle = if self.scripted_cycles.is_empty() {
                self.cycle
            } else {
                self.scripted_cycles.remove(0)
            };
            Ok(Self::snapshot_at(cycle))
        }

        async fn advance(&mut self) -> Result<Frame> {
            self.advances += 1;
            if self.advances % self.every == 0 {
                self.cycle += 1;
            }
            let header = FrameHeader::parse("FRAME 2 2 3 12").unwrap();
            Frame::from_parts(header, vec![0u8; 12])
        }
    }

    #[tokio::test]
    async fn test_aligned_step_advances_until_tick_boundary() {
        let mut source = ScriptSource::every(4);
        let mut sync = TickSync::new(TickSyncConfig::default());

        let before = sync.begin_step(&mut source).await.unwrap().unwrap();
        let (_frame, state) = sync
            .complete_step(&mut source, Some(before))
            .await
            .unwrap();

        // The counter bumps every 4th advance: exactly 4 advances needed
        assert_eq!(source.advances, 4);
        assert_eq!(sync.aligned(state.loop_cycle), before + 1);
        assert_eq!(sync.last_tick(), Some(before + 1));
    }

    #[tokio::test]
    async fn test_divisor_spans_multiple_raw_cycles() {
        let mut source = ScriptSource::every(1);
        let mut sync = TickSync::new(TickSyncConfig {
            initial_divisor: 2,
            ..TickSyncConfig::default()
        });

        let before = sync.begin_step(&mut source).await.unwrap().unwrap();
        sync.complete_step(&mut source, Some(before)).await.unwrap();

        // cycle 100 -> aligned 50; crossing needs raw cycle 102
        assert_eq!(source.advances, 2);
    }

    #[tokio::test]
    async fn test_free_running_issues_single_advance() {
        let mut source = ScriptSource::every(10);
        let mut sync = TickSync::new(TickSyncConfig {
            enabled: false,
            ..TickSyncConfig::default()
        });

        let before = sync.begin_step(&mut source).await.unwrap();
        assert_eq!(before, None);

        sync.complete_step(&mut source, before).await.unwrap();
        assert_eq!(source.advances, 1);
    }

    #[test]
    fn test_compute_divisor() {
        assert_eq!(TickSync::compute_divisor(10.0, 0.5), 5);
        // Cycle rate floored at 1/sec
        assert_eq!(TickSync::compute_divisor(0.0, 0.5), 1);
        assert_eq!(TickSync::compute_divisor(0.0, 2.0), 2);
        // Divisor floored at 1
        assert_eq!(TickSync::compute_divisor(1.0, 0.01), 1);
        assert_eq!(TickSync::compute_divisor(2.5, 0.6), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_calibrate_measures_cycle_rate() {
        // 15 cycles across the 1.5s window -> 10 cycles/sec
        let mut source = ScriptSource::scripted(vec![1000, 1015]);
        let mut sync = TickSync::new(TickSyncConfig::default());

        sync.calibrate(&mut source, 0.5).await.unwrap();
        assert_eq!(sync.divisor(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_calibrate_with_stalled_counter_floors_divisor() {
        let mut source = ScriptSource::scripted(vec![1000, 1000]);
        let mut sync = TickSync::new(TickSyncConfig::default());

        sync.calibrate(&mut source, 0.6).await.unwrap();
        assert_eq!(sync.divisor(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_calibrate_disabled_or_invalid_target_is_a_noop() {
        let mut source = ScriptSource::scripted(vec![1000, 1015]);
        let mut sync = TickSync::new(TickSyncConfig {
            enabled: false,
            ..TickSyncConfig::default()
        });
        sync.calibrate(&mut source, 0.5).await.unwrap();
        assert_eq!(sync.divisor(), 1);

        let mut sync = TickSync::new(TickSyncConfig::default());
        sync.calibrate(&mut source, 0.0).await.unwrap();
        assert_eq!(sync.divisor(), 1);
    }

    #[test]
    fn test_recalibration_cadence() {
        let sync = TickSync::new(TickSyncConfig {
            calibrate_every: 100,
            ..TickSyncConfig::default()
        });
        assert!(sync.should_recalibrate(100));
        assert!(sync.should_recalibrate(200));
        assert!(!sync.should_recalibrate(150));

        let disabled = TickSync::new(TickSyncConfig {
            auto_calibrate: false,
            calibrate_every: 100,
            ..TickSyncConfig::default()
        });
        assert!(!disabled.should_recalibrate(100));
    }
}
