//! projection-rtc - Main entry point
//!
//! Connects to a signaling server and negotiates one peer connection against
//! the simulated native layer.

mod args;

use args::Args;
use clap::Parser;
use log::{error, info, warn};
use projection_rtc::config::Config;
use projection_rtc::native::sim::SimulatedManager;
use projection_rtc::native::NativeManager;
use projection_rtc::transport::run_signaling_client;
use projection_rtc::webrtc::{PeerConnectionRegistry, SignalingOrchestrator};
use std::sync::Arc;
use tokio::sync::mpsc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse command line arguments
    let args = Args::parse();
    let loaded = args.load_config();

    // Initialize logging with noise filtering for the websocket stack
    let log_level = match (&loaded, args.verbose) {
        (_, true) => "debug".to_string(),
        (Ok(cfg), false) => cfg.logging.level.clone(),
        (Err(_), false) => "info".to_string(),
    };
    env_logger::Builder::new()
        .parse_filters(&std::env::var("PROJECTION_RTC_LOG").unwrap_or(log_level))
        .filter_module("tungstenite", log::LevelFilter::Warn)
        .filter_module("tokio_tungstenite", log::LevelFilter::Warn)
        .init();

    info!("projection-rtc v{}", env!("CARGO_PKG_VERSION"));

    let config = match loaded {
        Ok(cfg) => {
            info!("Loaded configuration from {:?}", args.config);
            cfg
        }
        Err(e) => {
            warn!("Failed to load config: {}, using defaults", e);
            let mut cfg = Config::default();
            if let Some(ref url) = args.url {
                cfg.signaling.url = url.clone();
            }
            cfg
        }
    };

    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        return Err(e.into());
    }

    let manager: Arc<dyn NativeManager> = Arc::new(SimulatedManager::auto_responding());
    let mut registry = PeerConnectionRegistry::new(Some(manager), config.webrtc.poll_interval());

    let (outbox_tx, outbox_rx) = mpsc::unbounded_channel::<String>();
    let mut orchestrator = SignalingOrchestrator::new(config.webrtc.orchestrator_config(), outbox_tx);

    let shutdown = run_signaling_client(
        &config.signaling.url,
        &mut registry,
        &mut orchestrator,
        outbox_rx,
        config.webrtc.poll_interval(),
    )
    .await?;

    info!(
        "Signaling session ended ({:?}), {} native payload(s) dropped",
        shutdown,
        registry.decode_failures()
    );
    Ok(())
}
