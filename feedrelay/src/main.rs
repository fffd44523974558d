use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use feedrelay::adapters::AdapterRegistry;
use feedrelay::config::EngineConfig;
use feedrelay::database;
use feedrelay::destination::{DestinationClient, RestClientConfig, RestDestinationClient};
use feedrelay::orchestrator::SqlxOrchestrator;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "feedrelay=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize database
    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:feedrelay.db?mode=rwc".to_string());

    let pool = database::init_pool(&database_url).await?;
    database::run_migrations(&pool).await?;

    let config = EngineConfig::from_env();
    let client: Arc<dyn DestinationClient> =
        Arc::new(RestDestinationClient::new(RestClientConfig::from_env()));

    // Site adapters are registered by the embedding application.
    let registry = AdapterRegistry::new();

    let orchestrator = SqlxOrchestrator::with_pool(pool, registry, client, config);
    orchestrator.launch()?;

    tracing::info!("feedrelay initialized successfully");

    tokio::signal::ctrl_c().await?;
    orchestrator.shutdown();
    orchestrator.join().await;

    Ok(())
}
