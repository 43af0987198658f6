use std::sync::Arc;

use burrow_gateway::config::{GatewayConfig, CLI};
use burrow_gateway::{telemetry, App, AppState};
use burrow_storage::{Backend, Storage};
use clap::Parser;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = CLI::try_parse()?;
    let config = GatewayConfig::resolve(cli)?;
    telemetry::init(config.log_format);

    let backend = Arc::new(Backend::open(&config.storage).await);

    info!(
        listen_addr = %config.server_address,
        base_url = %config.base_url,
        storage_backend = %backend.kind(),
        delete_mode = ?config.storage.delete_mode,
        "starting burrow http server"
    );

    let storage: Arc<dyn Storage> = backend.clone();
    let state = AppState::new(storage, config.base_url.clone())
        .with_trusted_subnet(config.trusted_subnet);

    let listener = tokio::net::TcpListener::bind(config.server_address).await?;
    let served = axum::serve(listener, App::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await;

    info!("draining storage before exit");
    backend.close().await;

    served?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
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
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received");
}
