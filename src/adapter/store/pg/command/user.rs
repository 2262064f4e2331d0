use async_trait::async_trait;

use crate::core::domain::command::CommandError;
use crate::core::domain::diagnostic_code::DiagnosticCode;
use crate::core::domain::entity::user::{User, UserCommand};
use crate::core::domain::operation::Operation;
use crate::core::domain::transaction::TransactionWrapper;

pub struct PgUserRepository;

#[async_trait]
impl UserCommand for PgUserRepository {
    async fn insert(
        &self,
        transaction: &mut Box<dyn TransactionWrapper>,
        user: &User,
    ) -> Result<(), CommandError> {
        let operation = Operation::statement("INSERT INTO users (id, name, email) VALUES ($1, $2, $3)")
            .bind(user.id)
            .bind(user.name.clone())
            .bind(user.email.clone());
        match transaction.execute(&operation).await {
            Ok(_) => Ok(()),
            Err(e) if e.diagnostic_code() == Some(&DiagnosticCode::UNIQUE_VIOLATION) => {
                Err(CommandError::user_already_exists(user.id))
            }
            Err(e) => Err(CommandError::Transaction(e)),
        }
    }
}
