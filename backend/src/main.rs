use std::io::IsTerminal;
use std::sync::Arc;

use anyhow::Context;
use backend::{
    config::{Config, StoreKind},
    http::{self, AppState},
    MemoryStore, RedisStore, SystemClock, TaskStore,
};
use tower_http::services::{ServeDir, ServeFile};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing()?;

    let config = Config::from_env().context("invalid configuration")?;

    let store: Arc<dyn TaskStore> = match config.store {
        StoreKind::Redis => Arc::new(
            RedisStore::connect(&config.redis_url)
                .await
                .with_context(|| format!("failed to connect to redis at {}", config.redis_url))?,
        ),
        StoreKind::Memory => {
            tracing::warn!("using the in-memory store; tasks are lost on restart");
            Arc::new(MemoryStore::new())
        }
    };

    let state = AppState::new(store, Arc::new(SystemClock), config.timezone);
    let index = config.static_dir.join("index.html");
    let app = http::router(state)
        .fallback_service(ServeDir::new(&config.static_dir).fallback(ServeFile::new(index)));

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    tracing::info!(
        addr = %config.bind_addr,
        store = ?config.store,
        timezone = %config.timezone,
        "server running"
    );
    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}

fn init_tracing() -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .context("invalid RUST_LOG filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))
}
