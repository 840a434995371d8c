//! scape-rl demo driver
//!
//! Connects to a running simulation client (optionally launching the
//! simulation processes first), resets the environment and plays a short
//! scripted episode.
//!
//! Usage: `scape-rl [host] [port] [idle-steps]`
//!
//! Set `SCAPE_RL_SERVER_DIR` and `SCAPE_RL_CLIENT_DIR` to have the driver
//! supervise the simulation processes itself, auto-tune included.

use anyhow::Result;
use scape_launcher::{Launcher, LauncherConfig};
use scape_rl_core::Action;
use scape_rl_env::{EnvConfig, ScapeEnv};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // Parse command line arguments
    let args: Vec<String> = std::env::args().collect();
    let host = args
        .get(1)
        .cloned()
        .unwrap_or_else(|| "127.0.0.1".to_string());
    let port: u16 = match args.get(2) {
        Some(raw) => raw.parse()?,
        None => 5656,
    };
    let idle_steps: u32 = match args.get(3) {
        Some(raw) => raw.parse()?,
        None => 5,
    };

    let config = EnvConfig {
        host,
        port,
        ..EnvConfig::default()
    };
    let mut env = ScapeEnv::new(config);

    // Supervise the simulation when its directories are configured
    if let (Ok(server_dir), Ok(client_dir)) = (
        std::env::var("SCAPE_RL_SERVER_DIR"),
        std::env::var("SCAPE_RL_CLIENT_DIR"),
    ) {
        info!("supervising simulation processes");
        let launcher_config = LauncherConfig::new(server_dir, client_dir).overridden_by_env();
        env = env.with_launcher(Launcher::new(launcher_config));
    }

    let obs = env.reset().await?;
    info!(
        "session ready: observation {}x{}, tick divisor {}",
        obs.width,
        obs.height,
        env.tick_divisor()
    );

    // Cursor to the centre, then try both buttons
    let space = env.action_space();
    let (width, height) = env.obs_size();
    let (cx, cy) = (width / 2, height / 2);
    for action in [
        space.move_to(cx, cy)?,
        space.left_click(cx, cy)?,
        space.right_click(cx, cy)?,
    ] {
        let outcome = env.step(action).await?;
        info!(
            "step {}: reward {:.3}",
            outcome.step_count,
            outcome.reward.total()
        );
    }

    // Idle steps to watch the state drift tick by tick
    for _ in 0..idle_steps {
        let outcome = env.step(Action::Noop).await?;
        info!(
            "step {}: xp {} levels {} reward {:.3}",
            outcome.step_count,
            outcome.state.total_xp,
            outcome.state.total_levels,
            outcome.reward.total()
        );
    }

    env.close().await;
    Ok(())
}
