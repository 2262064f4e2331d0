use thiserror::Error;

use crate::adapter::config::ConfigError;
use crate::adapter::init::AppInitializerError;

#[derive(Debug, Error)]
pub enum ApplicationError {
    #[error("Configuration error: {0}")]
    ConfigurationError(#[from] ConfigError),
    #[error("Failed to initialize application state: {0}")]
    InitializationError(#[from] AppInitializerError),
    #[error("Failed to start server: {0}")]
    ServerError(#[from] std::io::Error),
}
