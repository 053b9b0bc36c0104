#![deny(clippy::all, clippy::pedantic)]

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{ensure, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod app;

/// Headless physics sandbox.
#[derive(Parser, Debug)]
#[command(name = "sandbox_main", about = "Drop random bodies onto a floor and step the world")]
struct Args {
    /// JSON world configuration; defaults are used when omitted.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long, default_value_t = 600)]
    frames: u64,
    /// Seconds per frame.
    #[arg(long, default_value_t = 1.0 / 60.0)]
    dt: f32,
    #[arg(long, default_value_t = 32)]
    bodies: usize,
    #[arg(long, default_value_t = 7)]
    seed: u64,
    /// Sleep between frames and step by the wall clock instead of `--dt`.
    #[arg(long)]
    realtime: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    ensure!(args.dt.is_finite() && args.dt > 0.0, "--dt must be positive");

    let config = app::load_config(args.config.as_deref())?;
    tracing::info!(?config, "starting sandbox");

    let mut sandbox = app::Sandbox::new(&config, args.bodies, args.seed)?;
    let pacing = if args.realtime {
        app::Pacing::Realtime(Duration::from_secs_f32(args.dt))
    } else {
        app::Pacing::Fixed(args.dt)
    };
    let report = sandbox.run(args.frames, pacing)?;
    tracing::info!(
        frames = report.frames,
        alive = report.alive,
        removed = report.removed,
        contacts = report.contacts_started,
        lowest = ?report.lowest,
        "sandbox finished"
    );
    sandbox.shutdown()
}
