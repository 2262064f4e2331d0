use tracing_subscriber::EnvFilter;

use tx_orchestrator::adapter::config::AppConfig;
use tx_orchestrator::adapter::init::AppInitializer;
use tx_orchestrator::adapter::web::create_router::create_router;
use tx_orchestrator::error::ApplicationError;

#[tokio::main]
async fn main() -> Result<(), ApplicationError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AppConfig::load()?;
    let state = AppInitializer::initialize(&config).await?;
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(config.server_addr()).await?;
    tracing::info!(addr = config.server_addr(), "server running");
    axum::serve(listener, app).await?;

    Ok(())
}
