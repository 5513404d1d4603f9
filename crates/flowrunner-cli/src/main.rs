//! Development-time driver for `flowrunner-engine`: loads a flow/config
//! pair from disk, drives `Engine::start`/`stop`, and prints periodic
//! snapshots. This binary plays the role of "the collaborator" described in
//! the engine's design notes; it must never grow HTTP-control-API
//! responsibilities of its own.

use anyhow::{Context, Result};
use clap::Parser;
use flowrunner_engine::{Config, Engine, Flow};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;

#[derive(Parser)]
#[command(name = "flowrunner", about = "Run a FlowRunner flow against a target service")]
struct Args {
    /// Path to a Config JSON document.
    #[arg(long)]
    config: PathBuf,
    /// Path to a Flow JSON document.
    #[arg(long)]
    flow: PathBuf,
    /// How often to print a metrics snapshot while running.
    #[arg(long, default_value_t = 2)]
    snapshot_interval_secs: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let config: Config = load_json(&args.config).context("loading config")?;
    let flow: Flow = load_json(&args.flow).context("loading flow")?;

    let engine = Arc::new(Engine::new());
    engine.start(config, flow).await.context("starting engine")?;
    tracing::info!("engine running; press Ctrl+C to stop");

    let snapshot_engine = Arc::clone(&engine);
    let snapshots = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(args.snapshot_interval_secs));
        loop {
            interval.tick().await;
            let snapshot = snapshot_engine.snapshot();
            tracing::info!(
                running = snapshot.running,
                active_simulated_users = snapshot.active_simulated_users,
                total_requests = snapshot.total_requests,
                rps = snapshot.rps,
                flow_count = snapshot.flow_count,
                avg_flow_duration_ms = snapshot.avg_flow_duration_ms,
                "snapshot"
            );
        }
    });

    signal::ctrl_c().await.context("waiting for ctrl-c")?;
    tracing::info!("received shutdown signal");
    snapshots.abort();
    engine.stop().await;
    Ok(())
}

fn load_json<T: serde::de::DeserializeOwned>(path: &PathBuf) -> Result<T> {
    let file = std::fs::File::open(path).with_context(|| format!("opening {}", path.display()))?;
    serde_json::from_reader(file).with_context(|| format!("parsing {}", path.display()))
}
