use async_trait::async_trait;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::core::domain::diagnostic_code::DiagnosticCode;
use crate::core::domain::operation::{Operation, OperationResult};
use crate::core::domain::transaction_option::TransactionOption;

/// One live transaction, bound to a single attempt.
///
/// A successful `commit` closes the handle; a failed one may leave it open,
/// in which case the orchestrator rolls it back. `rollback` closes the handle
/// whether or not it succeeds. `close` is idempotent and is how the
/// orchestrator force-closes a handle it could not roll back.
#[async_trait]
pub trait TransactionWrapper: Send + Sync {
    fn option(&self) -> &TransactionOption;

    fn is_closed(&self) -> bool;

    /// Server-assigned identifier; `None` until the server has assigned one.
    async fn transaction_id(&mut self) -> Result<Option<String>, TransactionError>;

    async fn execute(&mut self, operation: &Operation) -> Result<OperationResult, TransactionError>;

    async fn commit(
        &mut self,
        mode: CommitMode,
        timeout: Option<Duration>,
    ) -> Result<(), TransactionError>;

    async fn rollback(&mut self) -> Result<(), TransactionError>;

    async fn close(&mut self) -> Result<(), TransactionError>;
}

/// How durably a commit must be acknowledged before `commit` returns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CommitMode {
    /// Whatever the server is configured to do.
    #[default]
    Default,
    Accepted,
    Available,
    Stored,
    Propagated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionPhase {
    Begin,
    Body,
    Commit,
    Rollback,
}

impl fmt::Display for TransactionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransactionPhase::Begin => "begin",
            TransactionPhase::Body => "body",
            TransactionPhase::Commit => "commit",
            TransactionPhase::Rollback => "rollback",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum TransactionError {
    #[error("Transaction execution failed [{code}]: {message}")]
    Execution {
        code: DiagnosticCode,
        message: String,
    },
    #[error("Connection error: {0}")]
    ConnectionError(String),
    #[error("Timed out during {phase} after {timeout:?}")]
    Timeout {
        phase: TransactionPhase,
        timeout: Duration,
    },
    #[error("Transaction is already closed")]
    Closed,
    #[error("Parameter binding error: {0}")]
    BindError(String),
    #[error("Failed to decode column {column}: {message}")]
    DecodeError { column: String, message: String },
    #[error("Invalid transaction option: {0}")]
    InvalidOption(#[from] crate::core::domain::transaction_option::TransactionOptionError),
}

impl TransactionError {
    pub fn execution(code: DiagnosticCode, message: impl Into<String>) -> Self {
        TransactionError::Execution {
            code,
            message: message.into(),
        }
    }

    pub fn diagnostic_code(&self) -> Option<&DiagnosticCode> {
        match self {
            TransactionError::Execution { code, .. } => Some(code),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, TransactionError::Timeout { .. })
    }
}
