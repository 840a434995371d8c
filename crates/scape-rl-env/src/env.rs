//! Environment layer over the bridge client
//!
//! `ScapeEnv` owns one connection and, optionally, the process
//! supervisor. `reset` brings the session to a stable, calibrated
//! starting state; `step` dispatches one action and returns exactly one
//! aligned tick's worth of change.

use crate::sync::{DEFAULT_TARGET_TICK_SECONDS, TickSource, TickSync, TickSyncConfig};
use async_trait::async_trait;
use scape_bridge::{BridgeClient, Connect, TcpConnector};
use scape_launcher::Launcher;
use scape_rl_core::{Action, ActionSpace, CursorButton, Frame, Result, ScapeRLError, StateSnapshot};
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};

/// The bridge client is the engine's tick source: state reads carry the
/// raw counter, `STEP` advances a render cycle.
#[async_trait]
impl<C: Connect> TickSource for BridgeClient<C> {
    async fn snapshot(&mut self) -> Result<StateSnapshot> {
        self.state().await
    }

    async fn advance(&mut self) -> Result<Frame> {
        self.step_frame().await
    }
}

/// Reward weights for the XP/level shaping signal
#[derive(Debug, Clone)]
pub struct RewardConfig {
    pub xp_scale: f64,
    pub level_bonus: f64,
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            xp_scale: 0.01,
            level_bonus: 10.0,
        }
    }
}

/// Reward of one step, split by component
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RewardBreakdown {
    pub xp: f64,
    pub levels: f64,
}

impl RewardBreakdown {
    pub fn total(&self) -> f64 {
        self.xp + self.levels
    }
}

fn compute_reward(
    prev: &StateSnapshot,
    current: &StateSnapshot,
    config: &RewardConfig,
) -> RewardBreakdown {
    let xp_delta = current.total_xp.saturating_sub(prev.total_xp) as f64;
    let level_delta = current.total_levels.saturating_sub(prev.total_levels) as f64;
    RewardBreakdown {
        xp: xp_delta * config.xp_scale,
        levels: level_delta * config.level_bonus,
    }
}

#[derive(Debug, Clone)]
pub struct EnvConfig {
    pub host: String,
    pub port: u16,
    /// Per-operation transport timeout
    pub io_timeout: Duration,
    /// Observation geometry; raw client frames when `None`
    pub resize: Option<(u32, u32)>,
    /// Steps per episode before truncation
    pub episode_length: u32,
    pub reward: RewardConfig,
    pub sync: TickSyncConfig,
    /// Connection attempts on reset
    pub connect_attempts: u32,
    pub connect_pause: Duration,
    /// Readiness poll cadence and budget
    pub ready_poll: Duration,
    pub ready_timeout: Duration,
    /// Consecutive unchanged state reads that count as stable
    pub stable_reads: u32,
    pub stable_poll: Duration,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5656,
            io_timeout: Duration::from_secs(10),
            resize: Some((384, 252)),
            episode_length: 10_000,
            reward: RewardConfig::default(),
            sync: TickSyncConfig::default(),
            connect_attempts: 30,
            connect_pause: Duration::from_millis(100),
            ready_poll: Duration::from_millis(100),
            ready_timeout: Duration::from_secs(60),
            stable_reads: 3,
            stable_poll: Duration::from_millis(100),
        }
    }
}

/// Result of one environment step
#[derive(Debug, Clone)]
pub struct StepOutcome {
    pub frame: Frame,
    pub state: StateSnapshot,
    pub reward: RewardBreakdown,
    /// Episode hit its step budget
    pub truncated: bool,
    pub step_count: u32,
}

/// One environment instance: one connection, one optional supervisor,
/// nothing shared with other instances.
pub struct ScapeEnv<C: Connect = TcpConnector> {
    config: EnvConfig,
    client: BridgeClient<C>,
    sync: TickSync,
    launcher: Option<Launcher>,
    raw_width: u32,
    raw_height: u32,
    prev_state: Option<StateSnapshot>,
    step_count: u32,
}

impl ScapeEnv<TcpConnector> {
    pub fn new(config: EnvConfig) -> Self {
        let connector = TcpConnector::with_timeout(&config.host, config.port, config.io_timeout);
        Self::with_client(config, BridgeClient::with_connector(connector))
    }
}

impl<C: Connect> ScapeEnv<C> {
    /// Build over an existing client (custom transport)
    pub fn with_client(config: EnvConfig, client: BridgeClient<C>) -> Self {
        let sync = TickSync::new(config.sync.clone());
        Self {
            config,
            client,
            sync,
            launcher: None,
            raw_width: 765,
            raw_height: 503,
            prev_state: None,
            step_count: 0,
        }
    }

    /// Attach a process supervisor; `reset` will start it and `close`
    /// will stop it.
    pub fn with_launcher(mut self, launcher: Launcher) -> Self {
        self.launcher = Some(launcher);
        self
    }

    /// Observation geometry
    pub fn obs_size(&self) -> (u32, u32) {
        self.config
            .resize
            .unwrap_or((self.raw_width, self.raw_height))
    }

    /// Valid coordinate range for actions
    pub fn action_space(&self) -> ActionSpace {
        let (width, height) = self.obs_size();
        ActionSpace::new(width, height)
    }

    pub fn tick_divisor(&self) -> u64 {
        self.sync.divisor()
    }

    async fn ensure_connected(&mut self) -> Result<()> {
        if self.client.is_connected() {
            return Ok(());
        }
        let mut last_err = None;
        for _ in 0..self.config.connect_attempts {
            match self.client.connect().await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    last_err = Some(e);
                    sleep(self.config.connect_pause).await;
                }
            }
        }
        Err(last_err
            .unwrap_or_else(|| ScapeRLError::Connection("failed to reach the bridge".into())))
    }

    /// Bring the session to a fresh, stable, calibrated starting state
    /// and return the first observation.
    pub async fn reset(&mut self) -> Result<Frame> {
        if let Some(launcher) = self.launcher.as_mut() {
            launcher.start().await?;
        }
        self.ensure_connected().await?;

        match self.initialize().await {
            Ok(frame) => Ok(frame),
            Err(e) => {
                self.close().await;
                Err(e)
            }
        }
    }

    async fn initialize(&mut self) -> Result<Frame> {
        let frame = self.client.frame().await?;
        self.note_frame_geometry(&frame);

        self.wait_for_ready().await?;
        let state = self.wait_for_stable_state().await?;

        if self.sync.config().auto_calibrate {
            let target = self.target_tick_seconds().await;
            self.sync.calibrate(&mut self.client, target).await?;
        }
        self.sync.observe(&state);

        self.prev_state = Some(state);
        self.step_count = 0;
        Ok(self.shape_frame(frame))
    }

    /// Dispatch one action and return one aligned tick's worth of change.
    ///
    /// In aligned mode this blocks until the simulation's tick counter
    /// crosses a boundary; a frozen simulation blocks it indefinitely
    /// (wrap a watchdog around the call when that matters).
    pub async fn step(&mut self, action: Action) -> Result<StepOutcome> {
        self.action_space().ensure(&action)?;
        self.ensure_connected().await?;

        let tick_before = self.sync.begin_step(&mut self.client).await?;
        self.dispatch(action).await?;
        let (frame, state) = self
            .sync
            .complete_step(&mut self.client, tick_before)
            .await?;
        self.note_frame_geometry(&frame);

        let reward = match &self.prev_state {
            Some(prev) => compute_reward(prev, &state, &self.config.reward),
            None => RewardBreakdown::default(),
        };
        self.prev_state = Some(state);
        self.step_count += 1;
        let truncated = self.step_count >= self.config.episode_length;

        if self.sync.should_recalibrate(self.step_count) {
            let target = self.target_tick_seconds().await;
            self.sync.calibrate(&mut self.client, target).await?;
        }

        Ok(StepOutcome {
            frame: self.shape_frame(frame),
            state,
            reward,
            truncated,
            step_count: self.step_count,
        })
    }

    /// Close the connection and stop the supervised processes. Safe to
    /// call repeatedly; never errors.
    pub async fn close(&mut self) {
        self.client.close().await;
        if let Some(launcher) = self.launcher.as_mut() {
            launcher.stop().await;
        }
    }

    async fn dispatch(&mut self, action: Action) -> Result<()> {
        match action {
            Action::Noop => Ok(()),
            Action::Move { x, y } => {
                let (rx, ry) = self.to_raw_coords(x, y);
                self.client.move_to(rx, ry).await?;
                Ok(())
            }
            Action::LeftClick { x, y } => self.click(x, y, CursorButton::Left).await,
            Action::RightClick { x, y } => self.click(x, y, CursorButton::Right).await,
        }
    }

    async fn click(&mut self, x: u32, y: u32, button: CursorButton) -> Result<()> {
        let (rx, ry) = self.to_raw_coords(x, y);
        self.client.move_to(rx, ry).await?;
        self.client.button_down(button).await?;
        self.client.button_up(button).await?;
        Ok(())
    }

    /// Map controller coordinates onto the raw client frame
    fn to_raw_coords(&self, x: u32, y: u32) -> (u32, u32) {
        let (width, height) = self.obs_size();
        let rx = (x as u64 * self.raw_width as u64 / width.max(1) as u64) as u32;
        let ry = (y as u64 * self.raw_height as u64 / height.max(1) as u64) as u32;
        (
            rx.min(self.raw_width.saturating_sub(1)),
            ry.min(self.raw_height.saturating_sub(1)),
        )
    }

    /// Track the client's actual frame geometry; it is authoritative.
    fn note_frame_geometry(&mut self, frame: &Frame) {
        if frame.width != self.raw_width || frame.height != self.raw_height {
            warn!(
                "client frame geometry changed: {}x{} -> {}x{}",
                self.raw_width, self.raw_height, frame.width, frame.height
            );
            self.raw_width = frame.width;
            self.raw_height = frame.height;
        }
    }

    fn shape_frame(&self, frame: Frame) -> Frame {
        match self.config.resize {
            Some((width, height)) => frame.resize_nearest(width, height),
            None => frame,
        }
    }

    /// Poll `READY` until the session has finished login/UI setup.
    async fn wait_for_ready(&mut self) -> Result<()> {
        let started = Instant::now();
        let mut last_note = Duration::ZERO;
        loop {
            if self.client.ready().await? {
                return Ok(());
            }
            let elapsed = started.elapsed();
            if elapsed > self.config.ready_timeout {
                return Err(ScapeRLError::Timeout(format!(
                    "login/initialization did not complete within {:?}",
                    self.config.ready_timeout
                )));
            }
            if elapsed.saturating_sub(last_note) >= Duration::from_secs(5) {
                info!("waiting for the session to become ready...");
                last_note = elapsed;
            }
            sleep(self.config.ready_poll).await;
        }
    }

    /// Wait until XP and level counters hold still across consecutive
    /// reads; login replays credit them in a burst.
    async fn wait_for_stable_state(&mut self) -> Result<StateSnapshot> {
        let mut stable_reads = 0;
        let mut last = self.client.state().await?;
        while stable_reads < self.config.stable_reads {
            sleep(self.config.stable_poll).await;
            let current = self.client.state().await?;
            if current.total_xp == last.total_xp && current.total_levels == last.total_levels {
                stable_reads += 1;
                debug!("stable state reads: {stable_reads}");
            } else {
                stable_reads = 0;
                last = current;
            }
        }
        Ok(last)
    }

    /// Seconds per aligned tick: configuration first, then the
    /// simulation's own declared cycle time, then the default.
    async fn target_tick_seconds(&self) -> f64 {
        if let Some(target) = self.sync.config().target_tick_seconds {
            return target;
        }
        if let Some(launcher) = &self.launcher {
            match launcher.load_server_config().await {
                Ok(config) => return (config.cycle_time_ms as f64 / 1000.0).max(0.01),
                Err(e) => debug!("could not read the simulation cycle time: {e}"),
            }
        }
        DEFAULT_TARGET_TICK_SECONDS
    }
}
