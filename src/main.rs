//! Card Key Portal - Main Application Entry Point
//!
//! Serves the admin API and the public redemption endpoint.
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment variables (refuses to start without `JWT_SECRET`)
//! 2. Open the configured storage backend (running migrations for PostgreSQL)
//! 3. Bootstrap the default admin account if none exists
//! 4. Build HTTP router with routes and middleware
//! 5. Start server on configured port

use std::sync::Arc;

use cardkey_portal::{
    AppState,
    config::Config,
    db, router,
    services::redemption_service::DirectFetchPolicy,
    storage::{JsonFileStorage, PostgresStorage, RedisStorage, Storage, StorageBackend},
};
use tracing_subscriber::EnvFilter;

/// Open the one storage backend named by the configuration.
async fn open_storage(config: &Config) -> anyhow::Result<Arc<dyn Storage>> {
    let storage: Arc<dyn Storage> = match config.storage_backend {
        StorageBackend::Json => Arc::new(JsonFileStorage::open(&config.data_path).await?),
        StorageBackend::Redis => {
            let url = config.redis_url.as_deref().unwrap_or_default();
            Arc::new(RedisStorage::open(url)?)
        }
        StorageBackend::Postgres => {
            let url = config.database_url.as_deref().unwrap_or_default();
            let pool = db::create_pool(url).await?;
            db::run_migrations(&pool).await?;
            tracing::info!("Database migrations complete");
            Arc::new(PostgresStorage::new(pool))
        }
    };

    storage.ping().await?;
    Ok(storage)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging with tracing subscriber. Reads RUST_LOG environment variable (defaults to "info" level)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = Config::from_env()?;
    tracing::info!(storage = %config.storage_backend, "Configuration loaded");

    let storage = open_storage(&config).await?;
    tracing::info!(storage = %storage.backend(), "Storage ready");

    if config.direct_fetch_policy == DirectFetchPolicy::Open {
        tracing::warn!(
            "DIRECT_FETCH_POLICY=open: plain card key fetches skip the confirm step; set it to 'gated' to require confirmation"
        );
    }

    let port = config.server_port;
    let state = AppState::new(storage, config);
    state.auth.ensure_default_admin().await?;

    let app = router(state);

    // Bind to network address and start server
    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
