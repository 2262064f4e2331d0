use thiserror::Error;

use crate::core::domain::transaction::TransactionError;

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Entity already exists: {entity_type} - {details}")]
    AlreadyExists {
        entity_type: String,
        details: String,
    },

    #[error(transparent)]
    Transaction(#[from] TransactionError),
}

impl CommandError {
    pub fn user_already_exists(id: i32) -> Self {
        CommandError::AlreadyExists {
            entity_type: "User".to_string(),
            details: format!("id: {}", id),
        }
    }
}
