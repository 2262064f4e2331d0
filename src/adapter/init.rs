use crate::adapter::config::AppConfig;
use crate::adapter::store::pg::command::user::PgUserRepository;
use crate::adapter::store::pg::session::PgSession;
use crate::adapter::web::app_state::AppState;
use crate::core::domain::transaction_counter::TransactionCounter;
use crate::core::domain::transaction_manager::TransactionManager;
use crate::core::use_case::create_user::CreateUserUseCase;
use sqlx::PgPool;
use std::sync::Arc;
use thiserror::Error;

pub struct AppInitializer;

impl AppInitializer {
    pub async fn initialize(config: &AppConfig) -> Result<Arc<AppState>, AppInitializerError> {
        let pool = PgPool::connect(config.db_url())
            .await
            .map_err(|e| AppInitializerError::DatabaseInitError(e.to_string()))?;

        let transaction_counter = Arc::new(TransactionCounter::new());
        let transaction_manager = Arc::new(TransactionManager::new(Arc::new(PgSession::new(pool))));
        transaction_manager.add_event_listener(transaction_counter.clone());

        let mut setting = CreateUserUseCase::default_setting(config.max_attempts())
            .map_err(|e| AppInitializerError::SettingError(e.to_string()))?;
        if let Some(timeout) = config.begin_timeout() {
            setting = setting.with_begin_timeout(timeout);
        }
        if let Some(timeout) = config.commit_timeout() {
            setting = setting.with_commit_timeout(timeout);
        }

        let user_create_use_case = Arc::new(CreateUserUseCase::new(
            Arc::new(PgUserRepository),
            transaction_manager,
            setting,
        ));

        Ok(Arc::new(AppState {
            transaction_counter,
            user_create_use_case,
        }))
    }
}

#[derive(Debug, Error)]
pub enum AppInitializerError {
    #[error("Failed to initialize database: {0}")]
    DatabaseInitError(String),
    #[error("Invalid transaction setting: {0}")]
    SettingError(String),
}
