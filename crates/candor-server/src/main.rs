//! # Candor Server
//!
//! Runs the background task manager until Ctrl+C or SIGTERM.

use candor_config::ConfigLoader;
use candor_core::{init_tracing, CandorResult, TelemetryConfig};
use candor_server::App;
use tokio::signal;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Application error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> CandorResult<()> {
    let config = match ConfigLoader::from_default_location() {
        Ok(loader) => loader.get().await,
        Err(e) => {
            let _ = init_tracing(&TelemetryConfig::default());
            return Err(e);
        }
    };

    if let Err(e) = init_tracing(&config.telemetry) {
        eprintln!("Logging already initialised: {e}");
    }

    info!("Starting Candor worker...");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!("Environment: {}", config.app.environment);

    let app = App::build(config);
    app.start()?;

    match app.backfill_thumbnails().await {
        Ok(0) => {}
        Ok(n) => info!(submissions = n, "Queued missing thumbnails"),
        Err(e) => warn!(error = %e, "Thumbnail backfill failed"),
    }

    shutdown_signal().await;

    app.shutdown().await;
    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        () = terminate => {
            info!("Received terminate signal, initiating graceful shutdown...");
        }
    }
}
