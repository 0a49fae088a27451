//! Hopmesh Sim - runs a device/router chain over an in-memory radio medium
//!
//! The first device sends confirmed messages to the last one across
//! `--routers` relays. Counters are logged at the end of the run, or printed
//! as JSON with `--json`.

mod sim;

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use hopmesh_core::MeshConfig;
use sim::{SimParams, Simulation};

#[derive(Parser)]
#[command(name = "hopmesh-sim")]
#[command(about = "Multi-hop hopmesh simulation over an in-memory radio medium")]
struct Args {
    /// Routers between the two devices
    #[arg(long, short, default_value_t = 2)]
    routers: u8,

    /// Confirmed messages to send
    #[arg(long, short, default_value_t = 5)]
    messages: u32,

    /// Spacing between messages in milliseconds
    #[arg(long, default_value_t = 200)]
    interval_ms: u64,

    /// Per-link frame loss probability (0.0 - 1.0)
    #[arg(long, default_value_t = 0.0)]
    loss: f64,

    /// Poll period in milliseconds
    #[arg(long, default_value_t = 1)]
    tick_ms: u64,

    /// Run time in milliseconds
    #[arg(long, default_value_t = 3000)]
    duration_ms: u64,

    /// JSON configuration file (defaults apply otherwise)
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Print the summary as JSON
    #[arg(long)]
    json: bool,

    /// Enable verbose logging
    #[arg(long, short)]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let config = match &args.config {
        Some(path) => MeshConfig::from_json_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => MeshConfig::default(),
    };

    let params = SimParams {
        routers: args.routers,
        messages: args.messages,
        message_interval: Duration::from_millis(args.interval_ms),
        loss: args.loss,
        tick: Duration::from_millis(args.tick_ms),
        duration: Duration::from_millis(args.duration_ms),
    };
    let mut simulation = Simulation::new(&config, params).context("Invalid simulation setup")?;

    let summary = tokio::select! {
        result = simulation.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted before the run finished");
            return Ok(());
        }
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        for station in &summary.stations {
            info!(
                address = %station.address,
                role = station.role,
                sent = station.frames_sent,
                retries = station.retries,
                received = station.frames_received,
                delivered = station.delivered,
                duplicates = station.duplicates,
                forwarded = station.forwarded,
                hop_exhausted = station.hop_exhausted,
                routes = station.routes,
                "Station"
            );
        }
        info!(
            transmissions = summary.air_transmissions,
            lost = summary.air_lost,
            "Air"
        );
    }

    Ok(())
}
