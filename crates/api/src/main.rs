//! FieldHQ API server
//!
//! Binds the HTTP surface: health checks, the cron entry point for the
//! trial lifecycle, and the subscription mutation routes.

use fieldhq_shared::{create_pool, run_migrations};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fieldhq_api::{create_router, AppState, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,fieldhq_api=debug,fieldhq_lifecycle=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting FieldHQ API server v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;
    if config.cron_secret_is_default() {
        tracing::warn!(
            "CRON_SECRET is not set; the well-known development default is in effect. \
             Set CRON_SECRET before exposing the cron endpoints."
        );
    }

    tracing::info!("Connecting to database...");
    let pool = create_pool(&config.database_url).await?;
    run_migrations(&pool).await?;
    tracing::info!("Database ready");

    let state = AppState::new(pool, config.clone());
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    tracing::info!(address = %config.bind_address, "Listening");
    axum::serve(listener, app).await?;

    Ok(())
}
