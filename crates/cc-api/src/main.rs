//! # cc-api: Binary Entry Point
//!
//! Starts the Axum HTTP server. Storage is Postgres when `DATABASE_URL` is
//! set, otherwise an in-memory store optionally seeded from `CC_FIXTURES`.

use std::sync::Arc;

use anyhow::Context;
use cc_api::state::{AppConfig, AppState, LogFormat};
use cc_broker_client::{BrokerClientConfig, DefaultClientProvider};
use cc_store::{init_pool, Fixtures, MemoryStore, PgStore, Store};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env().context("invalid configuration")?;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }

    let store = build_store(&config).await?;
    let brokers = DefaultClientProvider::new(BrokerClientConfig::new(config.broker_timeout_secs))
        .context("failed to build broker client")?;

    let port = config.port;
    let state = AppState::new(config, store, Arc::new(brokers));
    let app = cc_api::app(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Cloud controller API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn build_store(config: &AppConfig) -> anyhow::Result<Arc<dyn Store>> {
    if let Some(pool) = init_pool(config.database_url.as_deref())
        .await
        .context("database initialization failed")?
    {
        return Ok(Arc::new(PgStore::new(pool)));
    }

    let store = match &config.fixtures_path {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read fixtures from {path}"))?;
            let fixtures: Fixtures = serde_json::from_str(&raw)
                .with_context(|| format!("failed to parse fixtures from {path}"))?;
            tracing::info!(
                apps = fixtures.apps.len(),
                routes = fixtures.routes.len(),
                service_instances = fixtures.service_instances.len(),
                "Loaded in-memory fixtures"
            );
            MemoryStore::with_fixtures(fixtures)
        }
        None => MemoryStore::new(),
    };
    Ok(Arc::new(store))
}
