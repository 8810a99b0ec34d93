use anyhow::Result;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};

mod api;
mod config;
mod db;
mod diskgroup;
mod events;
mod executor;
mod state;

#[cfg(test)]
mod tests;

use config::AppConfig;
use db::Database;
use events::EventHub;
pub use state::{AppState, DaemonState, DaemonStatus};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "diskgroup_lcm=info,tower_http=info".into()),
        )
        .init();

    info!("Diskgroup LCM v{} starting up", env!("CARGO_PKG_VERSION"));

    let config = AppConfig::load()?;
    info!(
        "Configuration loaded: port={}, db_path={}, cells={}, asm_nodes={}",
        config.port,
        config.db_path,
        config.cell_hosts.len(),
        config.asm_nodes.len()
    );

    let db = Database::open(&config.db_path)?;
    db.run_migrations()?;
    info!("Database initialized at {}", config.db_path);

    let recovery = db.recover_stale_states()?;
    if recovery.operations_failed > 0 {
        warn!(
            "Marked {} interrupted operation(s) as failed: {:?}",
            recovery.operations_failed, recovery.interrupted_ids
        );
    }

    let state = Arc::new(AppState::new(db, config.clone(), EventHub::new(256)));
    let app = api::router(state.clone());

    let bind_addr = format!("127.0.0.1:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("Listening on {}", bind_addr);

    let shutdown_state = state.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            shutdown_state.request_cancel().await;
        })
        .await?;

    // Let the cancelled operation record its outcome before exiting.
    let task = state.background_task.lock().await.take();
    if let Some(handle) = task {
        info!("Waiting for the running operation to stop");
        if let Err(e) = handle.await {
            warn!("Operation task ended abnormally: {}", e);
        }
    }

    info!("Diskgroup LCM shut down cleanly");
    Ok(())
}

/// Wait for SIGTERM or SIGINT for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
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
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { warn!("Received Ctrl+C, shutting down..."); },
        () = terminate => { warn!("Received SIGTERM, shutting down..."); },
    }
}
