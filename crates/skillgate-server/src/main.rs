//! Skillgate Server - Main entry point

use anyhow::Result;
use skillgate_common::logging::{init_logging, LogConfig};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::signal;
use tracing::info;

use skillgate_server::{
    allowlist::AllowlistRegistry,
    clock::SystemClock,
    config::{BackendKind, Config},
    gateway::{create_router, AppState, Gateway},
    store::{memory::MemoryBackend, postgres::PgBackend, AssignmentStore, ReadBackend},
};

#[tokio::main]
async fn main() -> Result<()> {
    let log_config = LogConfig::default()
        .with_file_prefix("skillgate-server")
        .with_filter_directives("skillgate_server=debug,tower_http=debug,sqlx=warn")
        .merge_env()?;

    let _guard = init_logging(&log_config)?;

    info!("Starting Skillgate Server");

    let config = Config::load()?;
    info!(
        backend = ?config.backend,
        "Configuration loaded - server will bind to {}:{}",
        config.server.host, config.server.port
    );

    let registry = Arc::new(AllowlistRegistry::load(&config.allowlist_path)?);
    info!(
        path = %config.allowlist_path.display(),
        tables = registry.tables().count(),
        "Allowlist loaded"
    );

    match config.backend {
        BackendKind::Postgres => {
            let backend = Arc::new(PgBackend::connect(&config.database).await?);
            info!("Database connection pool established and migrations applied");
            serve(&config, registry, backend).await
        },
        BackendKind::Memory => {
            let backend = match &config.memory_seed_path {
                Some(path) => {
                    info!(seed = %path.display(), "Loading in-memory backend fixture");
                    MemoryBackend::from_seed_file(path)?
                },
                None => MemoryBackend::new(),
            };
            tracing::warn!("Running against the in-memory backend; data is not persisted");
            serve(&config, registry, Arc::new(backend)).await
        },
    }
}

async fn serve<B>(config: &Config, registry: Arc<AllowlistRegistry>, backend: Arc<B>) -> Result<()>
where
    B: ReadBackend + AssignmentStore + 'static,
{
    let gateway = Gateway::new(config, registry, backend, Arc::new(SystemClock));
    let state = AppState {
        gateway: Arc::new(gateway),
    };
    let app = create_router(state, &config.cors);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(config.server.shutdown_timeout_secs))
        .await?;

    info!("Server shut down gracefully");

    Ok(())
}

async fn shutdown_signal(timeout_secs: u64) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        },
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        },
    }

    info!("Waiting up to {} seconds for connections to close", timeout_secs);
    tokio::time::sleep(Duration::from_secs(timeout_secs.min(5))).await;
}
