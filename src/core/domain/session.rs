use async_trait::async_trait;
use std::time::Duration;

use crate::core::domain::transaction::{TransactionError, TransactionWrapper};
use crate::core::domain::transaction_option::TransactionOption;

/// Connection-side collaborator able to open transactions.
///
/// Implementations may be shared by concurrent `execute` calls as long as
/// the underlying transport supports concurrent transactions.
#[async_trait]
pub trait Session: Send + Sync {
    async fn begin(
        &self,
        option: &TransactionOption,
        timeout: Option<Duration>,
    ) -> Result<Box<dyn TransactionWrapper>, TransactionError>;
}
