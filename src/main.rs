use std::sync::Arc;

use anyhow::Context;
use incident_response::config::AppConfig;
use incident_response::db::{self, memory::MemoryStore, postgres::PgStore, store::Store};
use incident_response::{routes, AppState};
use mimalloc::MiMalloc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "incident_response=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let config = AppConfig::from_env().context("DATABASE_URL must be set")?;

    let store: Arc<dyn Store> = if config.uses_memory_store() {
        tracing::warn!("Using in-memory store; data is lost on restart");
        Arc::new(MemoryStore::new())
    } else {
        let pool = db::create_pool(&config.database_url, config.database_max_connections)
            .await
            .context("Failed to connect to database")?;
        db::run_migrations(&pool)
            .await
            .context("Failed to run migrations")?;
        Arc::new(PgStore::new(pool))
    };

    let (state, _consumer) = AppState::new(config.clone(), store);
    state.load_definitions().await;

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!(addr = %addr, "Starting incident response API server");

    axum::serve(listener, routes::router(state)).await?;

    Ok(())
}
