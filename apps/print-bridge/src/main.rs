//! # Titan Print Bridge
//!
//! HTTP front for the receipt printer.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Print Bridge Server                              │
//! │                                                                         │
//! │  POS ───► HTTP (3001) ───► DriverChain ───► RFCOMM ──► printer          │
//! │                               │                                         │
//! │                               └──► SPP (sdptool channel discovery)      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Configuration comes from `print.toml` in the platform config directory
//! (or the path given as the first argument) with `TITAN_*` environment
//! overrides on top.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use titan_print::{
    BridgeServer, BridgeState, DriverChain, NodeBinder, PrintConfig, PrintDriver, RfcommConnector,
    RfcommDriver, RfcommTool, SdpToolResolver, SppDriver,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(true)
        .init();

    info!("Starting Titan print bridge...");

    // Load configuration
    let config = PrintConfig::load_or_default(std::env::args().nth(1).map(PathBuf::from));
    config.validate()?;

    info!(
        address = ?config.device.address,
        channel = ?config.device.channel,
        primary_node = config.device.primary_node,
        secondary_node = config.device.secondary_node,
        line_width = config.receipt.line_width,
        timeout_secs = config.bridge.print_timeout_secs,
        "Configuration loaded"
    );
    if config.device.address.is_none() {
        warn!("No printer address configured, every print will fail until one is set");
    }

    // Driver chain: RFCOMM first, SPP second, each on its own device node
    let binder: Arc<dyn NodeBinder> = Arc::new(RfcommTool);
    let node_dir = config.device.node_dir.clone();
    let drivers: Vec<Arc<dyn PrintDriver>> = vec![
        Arc::new(RfcommDriver::new(
            Arc::new(RfcommConnector::new(node_dir.clone(), config.device.primary_node, binder.clone())),
            config.device.address.clone(),
            config.device.channel,
        )),
        Arc::new(SppDriver::new(
            Arc::new(RfcommConnector::new(node_dir, config.device.secondary_node, binder)),
            Arc::new(SdpToolResolver),
            config.device.address.clone(),
            config.device.channel,
        )),
    ];

    let state = Arc::new(BridgeState::from_config(&config, DriverChain::new(drivers)));

    // Start server
    let handle = BridgeServer::new(config.bind_address(), state).start().await?;
    info!(addr = %handle.local_addr(), "Print bridge ready");

    shutdown_signal().await;
    handle.shutdown().await;

    info!("Print bridge shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
