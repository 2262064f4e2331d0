use std::collections::HashSet;
use std::sync::{Arc, OnceLock};

use crate::core::domain::diagnostic_code::DiagnosticCode;
use crate::core::domain::transaction_operation::TransactionOperationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClassification {
    Retryable,
    Fatal,
}

impl RetryClassification {
    pub fn is_retryable(self) -> bool {
        self == RetryClassification::Retryable
    }
}

pub trait RetryClassifier: Send + Sync {
    fn classify(&self, failure: &TransactionOperationError) -> RetryClassification;
}

impl<F> RetryClassifier for F
where
    F: Fn(&TransactionOperationError) -> RetryClassification + Send + Sync,
{
    fn classify(&self, failure: &TransactionOperationError) -> RetryClassification {
        self(failure)
    }
}

static DEFAULT_RETRYABLE_CODES: [DiagnosticCode; 11] = [
    DiagnosticCode::OCC_READ_CONFLICT,
    DiagnosticCode::OCC_WRITE_CONFLICT,
    DiagnosticCode::WRITE_WRITE_CONFLICT,
    DiagnosticCode::WRITE_PRESERVE_CONFLICT,
    DiagnosticCode::LTX_READ_CONFLICT,
    DiagnosticCode::LTX_WRITE_CONFLICT,
    DiagnosticCode::RTX_CONFLICT,
    DiagnosticCode::BLOCKED_BY_CONCURRENT_OPERATION,
    DiagnosticCode::SERIALIZATION_FAILURE,
    DiagnosticCode::DEADLOCK_DETECTED,
    DiagnosticCode::ABORTED_RETRYABLE,
];

/// Retries only database-reported transaction failures whose code belongs to
/// the concurrency-control abort family. I/O failures, SQL errors, timeouts,
/// cancellation and application errors are fatal.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultRetryClassifier;

impl DefaultRetryClassifier {
    pub fn is_retryable_code(code: &DiagnosticCode) -> bool {
        DEFAULT_RETRYABLE_CODES.contains(code)
    }
}

impl RetryClassifier for DefaultRetryClassifier {
    fn classify(&self, failure: &TransactionOperationError) -> RetryClassification {
        match failure.diagnostic_code() {
            Some(code) if Self::is_retryable_code(code) => RetryClassification::Retryable,
            _ => RetryClassification::Fatal,
        }
    }
}

/// Process-wide classifier used when an execution setting carries none.
pub fn default_classifier() -> Arc<dyn RetryClassifier> {
    static DEFAULT: OnceLock<Arc<dyn RetryClassifier>> = OnceLock::new();
    DEFAULT
        .get_or_init(|| Arc::new(DefaultRetryClassifier))
        .clone()
}

/// Code-based classifier starting from the default retryable set.
#[derive(Debug, Clone)]
pub struct CodeSetRetryClassifier {
    retryable: HashSet<DiagnosticCode>,
}

impl Default for CodeSetRetryClassifier {
    fn default() -> Self {
        Self {
            retryable: DEFAULT_RETRYABLE_CODES.iter().cloned().collect(),
        }
    }
}

impl CodeSetRetryClassifier {
    pub fn with_retryable(mut self, code: DiagnosticCode) -> Self {
        self.retryable.insert(code);
        self
    }

    pub fn without_retryable(mut self, code: &DiagnosticCode) -> Self {
        self.retryable.remove(code);
        self
    }
}

impl RetryClassifier for CodeSetRetryClassifier {
    fn classify(&self, failure: &TransactionOperationError) -> RetryClassification {
        match failure.diagnostic_code() {
            Some(code) if self.retryable.contains(code) => RetryClassification::Retryable,
            _ => RetryClassification::Fatal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::domain::command::CommandError;
    use crate::core::domain::transaction::{TransactionError, TransactionPhase};
    use std::time::Duration;

    fn failure(code: DiagnosticCode) -> TransactionOperationError {
        TransactionError::execution(code, "aborted").into()
    }

    #[test]
    fn conflicts_are_retryable_by_default() {
        let classifier = DefaultRetryClassifier;
        assert_eq!(
            classifier.classify(&failure(DiagnosticCode::OCC_WRITE_CONFLICT)),
            RetryClassification::Retryable
        );
        assert_eq!(
            classifier.classify(&failure(DiagnosticCode::new("SERIALIZATION_FAILURE"))),
            RetryClassification::Retryable
        );
    }

    #[test]
    fn wrapped_command_failures_keep_their_code() {
        let error: TransactionOperationError = CommandError::from(TransactionError::execution(
            DiagnosticCode::DEADLOCK_DETECTED,
            "deadlock",
        ))
        .into();
        assert!(DefaultRetryClassifier.classify(&error).is_retryable());
    }

    #[test]
    fn non_transaction_failures_are_fatal() {
        let classifier = DefaultRetryClassifier;
        let cases: Vec<TransactionOperationError> = vec![
            TransactionError::ConnectionError("reset by peer".into()).into(),
            failure(DiagnosticCode::SYNTAX_ERROR),
            failure(DiagnosticCode::ABORTED),
            TransactionError::Timeout {
                phase: TransactionPhase::Commit,
                timeout: Duration::from_secs(1),
            }
            .into(),
            TransactionOperationError::application(std::fmt::Error),
        ];
        for case in &cases {
            assert_eq!(classifier.classify(case), RetryClassification::Fatal, "{case}");
        }
    }

    #[test]
    fn code_set_can_widen_and_narrow() {
        let classifier = CodeSetRetryClassifier::default()
            .with_retryable(DiagnosticCode::ABORTED)
            .without_retryable(&DiagnosticCode::OCC_READ_CONFLICT);
        assert!(classifier.classify(&failure(DiagnosticCode::ABORTED)).is_retryable());
        assert!(!classifier
            .classify(&failure(DiagnosticCode::OCC_READ_CONFLICT))
            .is_retryable());
        assert!(classifier
            .classify(&failure(DiagnosticCode::OCC_WRITE_CONFLICT))
            .is_retryable());
    }

    #[test]
    fn closures_are_classifiers() {
        let everything = |_: &TransactionOperationError| RetryClassification::Retryable;
        assert!(everything
            .classify(&TransactionError::Closed.into())
            .is_retryable());
    }
}
