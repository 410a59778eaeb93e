//! Cross-chain arbitrage detector — binary entry point
//!
//! Loads TOML configuration, wires up collaborators (Redis stream client by
//! default, in-memory stand-ins for the oracle/tracker/predictors since
//! those are out of scope, §1/§6), starts the Detector Core, and waits for
//! SIGINT/SIGTERM to trigger a graceful stop.

use anyhow::{Context, Result};
use clap::Parser;
use cross_chain_detector::collaborators::memory::{
    InMemoryBridgePredictor, InMemoryMlPredictor, InMemoryPriceOracle, InMemoryWhaleTracker,
};
use cross_chain_detector::collaborators::redis_stream::RedisStreamClient;
use cross_chain_detector::{DetectorConfig, DetectorCore, DetectorHandles, TomlConfig};
use futures::stream::StreamExt;
use signal_hook::consts::signal::{SIGINT, SIGTERM};
use signal_hook_tokio::Signals;
use std::sync::Arc;
use tracing::{error, info, warn, Level};

#[derive(Parser, Debug)]
#[command(name = "cross-chain-detector")]
#[command(about = "Cross-chain DEX arbitrage opportunity detector")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(long, env = "DETECTOR_CONFIG", default_value = "config.toml")]
    config: String,

    /// Redis connection URL for the stream client.
    #[arg(long, env = "REDIS_URL", default_value = "redis://127.0.0.1:6379")]
    redis_url: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let app_env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());
    let level = if app_env == "production" { Level::INFO } else { Level::DEBUG };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .init();

    let args = Args::parse();

    let toml_config = TomlConfig::load(&args.config)
        .with_context(|| format!("failed to load configuration from {}", args.config))?;
    let config = DetectorConfig::from_toml(toml_config);

    let warnings = config.validate().context("invalid detector configuration")?;
    for warning in warnings {
        warn!("{warning}");
    }

    let hostname = std::env::var("HOSTNAME").unwrap_or_else(|_| {
        hostname_fallback()
    });

    let stream_client = Arc::new(
        RedisStreamClient::connect(&args.redis_url)
            .await
            .with_context(|| format!("failed to connect to redis at {}", args.redis_url))?,
    );

    let handles = DetectorHandles {
        stream_client,
        price_oracle: Arc::new(InMemoryPriceOracle::new()),
        whale_tracker: Arc::new(InMemoryWhaleTracker::new()),
        bridge_predictor: Arc::new(InMemoryBridgePredictor::new()),
        ml_predictor: Arc::new(InMemoryMlPredictor::new()),
        hostname,
    };

    let core = DetectorCore::new(config, handles);

    core.start().await.context("failed to start detector core")?;
    info!("cross-chain detector started");

    let mut signals = Signals::new([SIGINT, SIGTERM]).context("failed to register signal handlers")?;
    let shutdown_core = core.clone();
    let signal_task = tokio::spawn(async move {
        if let Some(signal) = signals.next().await {
            info!(signal, "shutdown signal received");
            if let Err(e) = shutdown_core.stop().await {
                error!(error = %e, "error while stopping detector core");
            }
        }
    });

    signal_task.await.context("signal handler task panicked")?;
    info!("cross-chain detector stopped");
    Ok(())
}

fn hostname_fallback() -> String {
    std::process::id().to_string()
}
