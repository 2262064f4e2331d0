use async_trait::async_trait;
use futures::future::BoxFuture;
use thiserror::Error;

use crate::core::domain::command::CommandError;
use crate::core::domain::diagnostic_code::DiagnosticCode;
use crate::core::domain::transaction::{TransactionError, TransactionWrapper};

/// Failure raised by a transactional action.
#[derive(Debug, Error)]
pub enum TransactionOperationError {
    #[error(transparent)]
    TransactionError(#[from] TransactionError),

    #[error(transparent)]
    CommandError(#[from] CommandError),

    #[error("Application error: {0}")]
    Application(Box<dyn std::error::Error + Send + Sync>),
}

impl TransactionOperationError {
    pub fn application<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        TransactionOperationError::Application(Box::new(error))
    }

    /// The database failure behind this error, if there is one.
    pub fn transaction_error(&self) -> Option<&TransactionError> {
        match self {
            TransactionOperationError::TransactionError(e) => Some(e),
            TransactionOperationError::CommandError(CommandError::Transaction(e)) => Some(e),
            _ => None,
        }
    }

    pub fn diagnostic_code(&self) -> Option<&DiagnosticCode> {
        self.transaction_error().and_then(TransactionError::diagnostic_code)
    }
}

/// A unit of work run once per attempt against a fresh transaction.
///
/// Retried attempts start the action from the beginning, so anything it does
/// outside the transaction must tolerate repetition.
#[async_trait]
pub trait TransactionAction<T: Send + 'static>: Send + Sync {
    async fn execute(
        &self,
        transaction: &mut Box<dyn TransactionWrapper>,
    ) -> Result<T, TransactionOperationError>;
}

pub(crate) struct FnAction<F>(pub(crate) F);

#[async_trait]
impl<T, F> TransactionAction<T> for FnAction<F>
where
    T: Send + 'static,
    F: for<'a> Fn(
            &'a mut Box<dyn TransactionWrapper>,
        ) -> BoxFuture<'a, Result<T, TransactionOperationError>>
        + Send
        + Sync,
{
    async fn execute(
        &self,
        transaction: &mut Box<dyn TransactionWrapper>,
    ) -> Result<T, TransactionOperationError> {
        (self.0)(transaction).await
    }
}
