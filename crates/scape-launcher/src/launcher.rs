//! Simulation process supervisor
//!
//! Builds the server and client modules when needed, launches them with
//! the right environment, runs the auto-tune search before steady-state
//! operation, and stops everything gracefully.

use crate::config::{ServerConfig, TickStats, read_tick_stats};
use crate::tune::{self, TickProbe, TuneConfig};
use async_trait::async_trait;
use scape_rl_core::{Result, ScapeRLError};
use std::collections::HashSet;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::time::{Instant, sleep};
use tracing::{info, warn};

fn env_path(key: &str) -> Option<PathBuf> {
    std::env::var(key)
        .ok()
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

/// Supervisor configuration
#[derive(Debug, Clone)]
pub struct LauncherConfig {
    /// Simulation server working directory
    pub server_dir: PathBuf,
    /// Simulation client working directory
    pub client_dir: PathBuf,
    /// Config file name inside `server_dir`
    pub server_config: String,
    /// JDK to run the simulation with; inherits the ambient one if unset
    pub java_home: Option<PathBuf>,
    /// Maven binary for build-if-needed; `mvn` from PATH if unset
    pub mvn_path: Option<PathBuf>,
    /// Maven module names, relative to the parent of `server_dir`
    pub server_module: String,
    pub client_module: String,
    /// Jar paths relative to each module directory
    pub server_jar: String,
    pub client_jar: String,
    /// Bridge port the client listens on
    pub port: u16,
    pub username: String,
    pub password: String,
    /// Point the client at the local server
    pub local: bool,
    /// Run the client without a display
    pub headless: bool,
    /// Run the tick-interval search before the first launch
    pub auto_tune: bool,
    pub tune: TuneConfig,
    /// Grace period before a stubborn child is force-killed
    pub stop_grace: Duration,
    /// Settle time after each spawn
    pub spawn_settle: Duration,
}

impl LauncherConfig {
    pub fn new(server_dir: impl Into<PathBuf>, client_dir: impl Into<PathBuf>) -> Self {
        Self {
            server_dir: server_dir.into(),
            client_dir: client_dir.into(),
            server_config: "ServerConfig.json".to_string(),
            java_home: None,
            mvn_path: None,
            server_module: "sim-server".to_string(),
            client_module: "sim-client".to_string(),
            server_jar: "target/server-1.0-jar-with-dependencies.jar".to_string(),
            client_jar: "target/client-1.0-jar-with-dependencies.jar".to_string(),
            port: 5656,
            username: "agent".to_string(),
            password: "rl".to_string(),
            local: true,
            headless: true,
            auto_tune: true,
            tune: TuneConfig::default(),
            stop_grace: Duration::from_secs(5),
            spawn_settle: Duration::from_secs(2),
        }
    }

    /// Apply `SCAPE_RL_*` environment overrides on top of this config.
    pub fn overridden_by_env(mut self) -> Self {
        if let Some(dir) = env_path("SCAPE_RL_SERVER_DIR") {
            self.server_dir = dir;
        }
        if let Some(dir) = env_path("SCAPE_RL_CLIENT_DIR") {
            self.client_dir = dir;
        }
        if let Some(dir) = env_path("SCAPE_RL_JAVA_HOME") {
            self.java_home = Some(dir);
        }
        if let Some(path) = env_path("SCAPE_RL_MVN") {
            self.mvn_path = Some(path);
        }
        if let Ok(name) = std::env::var("SCAPE_RL_USERNAME") {
            if !name.is_empty() {
                self.username = name;
            }
        }
        self
    }
}

/// Owns the simulation processes and the pre-launch tuning state.
///
/// The built-module cache and the auto-tuned flag live here, per
/// instance: dropping the supervisor resets both.
pub struct Launcher {
    config: LauncherConfig,
    server: Option<Child>,
    client: Option<Child>,
    built_modules: HashSet<String>,
    auto_tuned: bool,
}

impl Launcher {
    pub fn new(config: LauncherConfig) -> Self {
        Self {
            config,
            server: None,
            client: None,
            built_modules: HashSet::new(),
            auto_tuned: false,
        }
    }

    pub fn config(&self) -> &LauncherConfig {
        &self.config
    }

    pub fn config_path(&self) -> PathBuf {
        self.config.server_dir.join(&self.config.server_config)
    }

    pub async fn load_server_config(&self) -> Result<ServerConfig> {
        ServerConfig::load(&self.config_path()).await
    }

    /// Persist a new tick interval, leaving every other key untouched.
    pub async fn set_cycle_time_ms(&self, ms: u64) -> Result<()> {
        let path = self.config_path();
        let mut config = ServerConfig::load(&path).await?;
        config.cycle_time_ms = ms;
        config.store(&path).await
    }

    async fn tick_stats_path(&self) -> Result<PathBuf> {
        let config = self.load_server_config().await?;
        Ok(self.config.server_dir.join(&config.rl_tick_report_file))
    }

    /// Poll the tick-statistics artifact until it appears or the timeout
    /// elapses.
    pub async fn wait_for_tick_stats(&self, timeout: Duration) -> Result<Option<TickStats>> {
        let path = self.tick_stats_path().await?;
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if let Some(stats) = read_tick_stats(&path).await {
                return Ok(Some(stats));
            }
            sleep(self.config.tune.poll_interval).await;
        }
        Ok(None)
    }

    fn spawn_env(&self) -> Vec<(OsString, OsString)> {
        let mut vars = Vec::new();
        if let Some(java_home) = &self.config.java_home {
            vars.push((OsString::from("JAVA_HOME"), java_home.as_os_str().to_owned()));
            let mut paths = vec![java_home.join("bin")];
            paths.extend(std::env::split_paths(
                &std::env::var_os("PATH").unwrap_or_default(),
            ));
            if let Ok(joined) = std::env::join_paths(paths) {
                vars.push((OsString::from("PATH"), joined));
            }
        }
        vars
    }

    /// Build a maven module once per supervisor lifetime.
    async fn build(&mut self, module: &str) -> Result<()> {
        if self.built_modules.contains(module) {
            return Ok(());
        }

        let mvn = match &self.config.mvn_path {
            Some(path) => {
                if !path.is_file() {
                    return Err(ScapeRLError::Launch(format!(
                        "maven not found: {}",
                        path.display()
                    )));
                }
                path.clone()
            }
            None => PathBuf::from("mvn"),
        };
        let build_root = self.config.server_dir.parent().ok_or_else(|| {
            ScapeRLError::Launch(format!(
                "server dir {} has no parent to build from",
                self.config.server_dir.display()
            ))
        })?;

        info!("building module {module}");
        let status = Command::new(&mvn)
            .args(["-pl", module, "-am", "package"])
            .current_dir(build_root)
            .envs(self.spawn_env())
            .status()
            .await
            .map_err(|e| ScapeRLError::Launch(format!("failed to run maven: {e}")))?;

        if !status.success() {
            return Err(ScapeRLError::Launch(format!(
                "maven build of {module} failed: {status}"
            )));
        }
        self.built_modules.insert(module.to_string());
        Ok(())
    }

    /// Start the simulation server. A second call while running is a no-op.
    pub async fn start_server(&mut self) -> Result<()> {
        if self.server.is_some() {
            return Ok(());
        }
        if !self.config.server_dir.is_dir() {
            return Err(ScapeRLError::Launch(format!(
                "server dir not found: {}",
                self.config.server_dir.display()
            )));
        }
        let module = self.config.server_module.clone();
        self.build(&module).await?;

        info!("starting simulation server in {}", self.config.server_dir.display());
        let child = Command::new("java")
            .args(["-jar", &self.config.server_jar, "-c", &self.config.server_config])
            .current_dir(&self.config.server_dir)
            .envs(self.spawn_env())
            .stdin(Stdio::null())
            .spawn()
            .map_err(|e| ScapeRLError::Launch(format!("failed to spawn server: {e}")))?;
        self.server = Some(child);

        sleep(self.config.spawn_settle).await;
        Ok(())
    }

    /// Start the simulation client. A second call while running is a no-op.
    pub async fn start_client(&mut self) -> Result<()> {
        if self.client.is_some() {
            return Ok(());
        }
        if !self.config.client_dir.is_dir() {
            return Err(ScapeRLError::Launch(format!(
                "client dir not found: {}",
                self.config.client_dir.display()
            )));
        }
        let module = self.config.client_module.clone();
        self.build(&module).await?;

        let port = self.config.port.to_string();
        let mut command = Command::new("java");
        command
            .args(["-jar", &self.config.client_jar, "-rl", "-rl-port", &port])
            .current_dir(&self.config.client_dir)
            .envs(self.spawn_env())
            .stdin(Stdio::null());
        if self.config.headless {
            command.arg("-headless");
        }
        if self.config.local {
            command.arg("-local");
        }
        command.args(["-u", &self.config.username, "-p", &self.config.password]);

        info!(
            "starting simulation client on port {} (headless={})",
            self.config.port, self.config.headless
        );
        let child = command
            .spawn()
            .map_err(|e| ScapeRLError::Launch(format!("failed to spawn client: {e}")))?;
        self.client = Some(child);

        sleep(self.config.spawn_settle).await;
        Ok(())
    }

    /// Run the tick-interval search and persist the winner. At most once
    /// per supervisor lifetime; a no-op when disabled.
    pub async fn auto_tune(&mut self) -> Result<()> {
        if !self.config.auto_tune || self.auto_tuned {
            return Ok(());
        }
        info!("auto-tuning the simulation tick interval");

        let tune_config = self.config.tune.clone();
        let outcome = tune::run(&tune_config, self).await?;
        self.set_cycle_time_ms(outcome.chosen_ms).await?;
        self.auto_tuned = true;
        info!("tick interval set to {}ms", outcome.chosen_ms);
        Ok(())
    }

    /// Auto-tune, then bring up server and client.
    pub async fn start(&mut self) -> Result<()> {
        self.auto_tune().await?;
        self.start_server().await?;
        self.start_client().await
    }

    /// Stop everything. Graceful first, forced after the grace period.
    /// Safe to call with nothing running; never errors.
    pub async fn stop(&mut self) {
        let children = [self.client.take(), self.server.take()];
        for child in children.into_iter().flatten() {
            stop_child(child, self.config.stop_grace).await;
        }
    }
}

#[async_trait]
impl TickProbe for Launcher {
    /// One auto-tune probe: persist the candidate interval, run the
    /// server long enough to produce the artifact, stop it again.
    async fn sample(&mut self, interval_ms: u64) -> Result<Option<TickStats>> {
        self.set_cycle_time_ms(interval_ms).await?;
        self.start_server().await?;
        let stats = self.wait_for_tick_stats(self.config.tune.timeout).await;
        self.stop().await;
        stats
    }
}

impl Drop for Launcher {
    fn drop(&mut self) {
        // Last-ditch cleanup if the caller never stopped us
        for child in [&mut self.client, &mut self.server].into_iter().flatten() {
            let _ = child.start_kill();
        }
    }
}

async fn stop_child(mut child: Child, grace: Duration) {
    terminate(&child);
    match tokio::time::timeout(grace, child.wait()).await {
        Ok(_) => {}
        Err(_) => {
            warn!("process ignored the grace period, killing");
            let _ = child.start_kill();
            let _ = child.wait().await;
        }
    }
}

/// Ask the child to exit. SIGTERM on unix; elsewhere there is no graceful
/// signal, so the grace period degrades to an immediate kill.
fn terminate(child: &Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        unsafe {
            libc::kill(pid as libc::pid_t, libc::SIGTERM);
        }
    }
    #[cfg(not(unix))]
    {
        let _ = child;
    }
}
