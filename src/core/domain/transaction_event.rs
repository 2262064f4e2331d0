use std::error::Error;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use crate::core::domain::option_supplier::RetryDecision;
use crate::core::domain::retry_classifier::RetryClassification;
use crate::core::domain::transaction::TransactionPhase;
use crate::core::domain::transaction_option::TransactionOption;

pub type ListenerResult = Result<(), Box<dyn Error + Send + Sync>>;

#[derive(Debug)]
pub struct AttemptStarted<'a> {
    pub attempt: usize,
    pub option: &'a TransactionOption,
}

#[derive(Debug)]
pub struct AttemptEnded<'a> {
    pub attempt: usize,
    pub option: &'a TransactionOption,
    /// Phase that failed; `None` when the attempt committed.
    pub phase: Option<TransactionPhase>,
    pub failure: Option<&'a (dyn Error + 'static)>,
    /// `None` when the attempt committed or the failure bypassed
    /// classification (begin failure, timeout, cancellation).
    pub classification: Option<RetryClassification>,
}

impl AttemptEnded<'_> {
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }
}

#[derive(Debug)]
pub struct RetryScheduled<'a> {
    /// Index of the attempt about to start.
    pub attempt: usize,
    pub failure: &'a (dyn Error + 'static),
    pub decision: &'a RetryDecision,
}

#[derive(Debug)]
pub struct TransactionFinished<'a> {
    /// Index of the last attempt that ran, or `None` if none ran.
    pub attempt: Option<usize>,
    pub attempts: usize,
    pub option: Option<&'a TransactionOption>,
    pub failure: Option<&'a (dyn Error + 'static)>,
}

impl TransactionFinished<'_> {
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }
}

/// Observer of the attempt loop. Errors and panics raised by a listener are
/// logged and otherwise ignored.
pub trait TransactionEventListener: Send + Sync {
    fn on_attempt_start(&self, _event: &AttemptStarted<'_>) -> ListenerResult {
        Ok(())
    }

    fn on_attempt_end(&self, _event: &AttemptEnded<'_>) -> ListenerResult {
        Ok(())
    }

    fn on_retry(&self, _event: &RetryScheduled<'_>) -> ListenerResult {
        Ok(())
    }

    fn on_finish(&self, _event: &TransactionFinished<'_>) -> ListenerResult {
        Ok(())
    }
}

pub(crate) struct EventDispatcher {
    listeners: Vec<Arc<dyn TransactionEventListener>>,
}

impl EventDispatcher {
    pub(crate) fn new(listeners: Vec<Arc<dyn TransactionEventListener>>) -> Self {
        Self { listeners }
    }

    pub(crate) fn attempt_started(&self, event: &AttemptStarted<'_>) {
        self.dispatch("attempt_start", |listener| listener.on_attempt_start(event));
    }

    pub(crate) fn attempt_ended(&self, event: &AttemptEnded<'_>) {
        self.dispatch("attempt_end", |listener| listener.on_attempt_end(event));
    }

    pub(crate) fn retry_scheduled(&self, event: &RetryScheduled<'_>) {
        self.dispatch("retry", |listener| listener.on_retry(event));
    }

    pub(crate) fn finished(&self, event: &TransactionFinished<'_>) {
        self.dispatch("finish", |listener| listener.on_finish(event));
    }

    fn dispatch<F>(&self, event: &'static str, notify: F)
    where
        F: Fn(&dyn TransactionEventListener) -> ListenerResult,
    {
        for listener in &self.listeners {
            match catch_unwind(AssertUnwindSafe(|| notify(listener.as_ref()))) {
                Ok(Ok(())) => {}
                Ok(Err(error)) => {
                    tracing::warn!(event, error = %error, "transaction listener failed");
                }
                Err(_) => {
                    tracing::warn!(event, "transaction listener panicked");
                }
            }
        }
    }
}
