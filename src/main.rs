use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rollcall::api::{self, state::AppState};
use rollcall::config::Config;
use rollcall::db::{self, PgStore};
use rollcall::services::{monitor::MonitorRegistry, recognition::RecognitionClient};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rollcall=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting attendance server...");

    // Load configuration
    let config = Config::from_env()?;
    tracing::info!("Configuration loaded successfully");

    // Create database pool
    let pool = db::create_pool(&config.database_url).await?;
    tracing::info!("Database pool created");

    // Run migrations
    db::run_migrations(&pool).await?;
    tracing::info!("Database migrations completed");

    let recognition = RecognitionClient::from_config(&config)?;
    tracing::info!(url = %config.recognition_service_url, "Recognition client configured");

    // Build application state
    let monitors = Arc::new(MonitorRegistry::default());
    let state = AppState {
        store: Arc::new(PgStore::new(pool)),
        recognition: Arc::new(recognition),
        monitors: monitors.clone(),
        config: config.clone(),
    };

    let app = api::app(state);

    // Start server
    let listener = api::bind(&config.host, config.port)
        .await
        .with_context(|| format!("failed to bind {}:{}", config.host, config.port))?;
    tracing::info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    monitors.shutdown();
    tracing::info!("Detection monitors stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, cleaning up...");
}
