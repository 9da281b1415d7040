//! Greenlight API Server

use std::sync::Arc;

use anyhow::Context;
use greenlight_api::{
    config::{Config, LogFormat},
    routes::create_router,
    server,
    state::AppState,
    store::PgStore,
};
use greenlight_shared::{create_pool, run_migrations};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,greenlight_api=debug".into());
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    init_tracing(config.log_format);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = %config.environment,
        "starting Greenlight API server"
    );

    tracing::info!("connecting to database");
    let pool = create_pool(&config.database_url, &config.pool)
        .await
        .context("failed to connect to database")?;
    run_migrations(&pool)
        .await
        .context("failed to run database migrations")?;
    tracing::info!("database connection pool established");

    let state = AppState::new(config, Arc::new(PgStore::new(pool.clone())));
    let app = create_router(state.clone());

    server::serve(state, app).await?;

    pool.close().await;
    Ok(())
}
