//! `glvault` server entry point.
//!
//! Loads configuration, bootstraps the storage backend and core
//! subsystems, then serves the Axum router with graceful shutdown on
//! SIGINT/SIGTERM.

use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::info;

use glvault_core::relay::{default_param_map, RelayConfig};
use glvault_core::{AuditLog, CredentialStore, RelayHandler};
use glvault_storage::{MemoryBackend, StorageBackend};

use glvault_server::config::{Config, StorageBackendKind};
use glvault_server::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("failed to load configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .json()
        .init();

    info!(storage = ?config.storage, bind_addr = %config.bind_addr, "glvault starting");
    let bind_addr = config.bind_addr;

    let state = build_app_state(config).await?;
    let app = glvault_server::build_router(state);

    let listener = TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("failed to bind to {bind_addr}"))?;

    info!(addr = %bind_addr, "glvault server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("glvault server stopped");
    Ok(())
}

async fn build_app_state(config: Config) -> anyhow::Result<Arc<AppState>> {
    let backend: Arc<dyn StorageBackend> = match config.storage {
        StorageBackendKind::Memory => {
            info!("using in-memory storage (data will not persist)");
            Arc::new(MemoryBackend::new())
        }
        StorageBackendKind::Redis => {
            let url = config
                .redis_url
                .clone()
                .context("GLVAULT_REDIS_URL is required when GLVAULT_STORAGE=redis")?;
            info!("connecting to redis storage backend");
            Arc::new(
                glvault_storage::RedisBackend::connect(url)
                    .await
                    .context("failed to connect to redis storage")?,
            )
        }
    };

    let store = Arc::new(CredentialStore::new(
        Arc::clone(&backend),
        config.master_key,
        config.rate_limit_window_ms,
    ));
    let audit = Arc::new(AuditLog::new(Arc::clone(&backend)));

    let mut param_map = default_param_map();
    param_map.extend(config.extra_param_map.iter().cloned());

    let relay_config = RelayConfig {
        hmac_secret: config.hmac_secret,
        max_age_ms: config.max_request_age_ms,
        window_ms: config.rate_limit_window_ms,
        upstream_timeout: config.upstream_timeout,
        param_map,
        nonce_set: None,
    };
    let relay = Arc::new(RelayHandler::new(Arc::clone(&store), Arc::clone(&audit), relay_config));

    Ok(Arc::new(AppState {
        store,
        audit,
        relay,
        admin_token: config.admin_token,
        started_at: Instant::now(),
    }))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.ok();
    };

    #[cfg(unix)]
    let terminate = async {
        if let Ok(mut sig) = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            sig.recv().await;
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("shutdown signal received, stopping server");
}
