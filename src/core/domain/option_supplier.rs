use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use crate::core::domain::transaction_operation::TransactionOperationError;
use crate::core::domain::transaction_option::TransactionOption;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    Execute(TransactionOption),
    /// Run again without consuming the attempt budget.
    ExecuteUncounted(TransactionOption),
    GiveUp,
}

impl RetryDecision {
    pub fn option(&self) -> Option<&TransactionOption> {
        match self {
            RetryDecision::Execute(option) | RetryDecision::ExecuteUncounted(option) => Some(option),
            RetryDecision::GiveUp => None,
        }
    }
}

/// Chooses the transaction option for each attempt of one `execute` call.
///
/// `attempt` is the number of counted attempts already made, so it does not
/// advance across [`RetryDecision::ExecuteUncounted`] decisions.
/// `previous_failure` is `None` only for the first call of an `execute` call.
pub trait TransactionOptionSupplier: Send + Sync {
    fn next(
        &self,
        attempt: usize,
        previous_failure: Option<&TransactionOperationError>,
    ) -> RetryDecision;
}

/// Attempt `i` uses the `i`-th option; past the end it gives up.
#[derive(Debug, Clone)]
pub struct FixedSequenceSupplier {
    options: Vec<TransactionOption>,
}

impl FixedSequenceSupplier {
    pub fn new(options: impl IntoIterator<Item = TransactionOption>) -> Self {
        Self {
            options: options.into_iter().collect(),
        }
    }
}

impl TransactionOptionSupplier for FixedSequenceSupplier {
    fn next(&self, attempt: usize, _: Option<&TransactionOperationError>) -> RetryDecision {
        match self.options.get(attempt) {
            Some(option) => RetryDecision::Execute(option.clone()),
            None => RetryDecision::GiveUp,
        }
    }
}

/// Same option for every attempt, optionally bounded.
#[derive(Debug, Clone)]
pub struct AlwaysRetrySupplier {
    option: TransactionOption,
    max_attempts: Option<usize>,
}

impl AlwaysRetrySupplier {
    pub fn new(option: TransactionOption) -> Self {
        Self {
            option,
            max_attempts: None,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }
}

impl TransactionOptionSupplier for AlwaysRetrySupplier {
    fn next(&self, attempt: usize, _: Option<&TransactionOperationError>) -> RetryDecision {
        match self.max_attempts {
            Some(max) if attempt >= max => RetryDecision::GiveUp,
            _ => RetryDecision::Execute(self.option.clone()),
        }
    }
}

/// Runs each option a given number of times before moving on to the next,
/// e.g. three optimistic attempts followed by one long transaction.
#[derive(Debug, Clone, Default)]
pub struct MultipleListSupplier {
    entries: Vec<(TransactionOption, usize)>,
}

impl MultipleListSupplier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(mut self, option: TransactionOption, times: usize) -> Self {
        if times > 0 {
            self.entries.push((option, times));
        }
        self
    }
}

impl TransactionOptionSupplier for MultipleListSupplier {
    fn next(&self, attempt: usize, _: Option<&TransactionOperationError>) -> RetryDecision {
        // walk by subtraction so a `usize::MAX` repeat count cannot overflow
        let mut remaining = attempt;
        for (option, times) in &self.entries {
            if remaining < *times {
                return RetryDecision::Execute(option.clone());
            }
            remaining -= times;
        }
        RetryDecision::GiveUp
    }
}

/// Hooks for a user-defined supplier; see [`CustomSupplier`].
pub trait TransactionOptionStrategy: Send + Sync {
    fn compute_first(&self) -> RetryDecision;

    fn compute_retry(&self, attempt: usize, failure: &TransactionOperationError) -> RetryDecision;
}

/// Adapts a [`TransactionOptionStrategy`] and applies an optional limit to
/// counted attempts. Uncounted decisions bypass the limit.
pub struct CustomSupplier<S> {
    strategy: S,
    max_attempts: Option<usize>,
}

impl<S: TransactionOptionStrategy> CustomSupplier<S> {
    pub fn new(strategy: S) -> Self {
        Self {
            strategy,
            max_attempts: None,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }
}

impl<S: TransactionOptionStrategy> TransactionOptionSupplier for CustomSupplier<S> {
    fn next(
        &self,
        attempt: usize,
        previous_failure: Option<&TransactionOperationError>,
    ) -> RetryDecision {
        let decision = match previous_failure {
            None => self.strategy.compute_first(),
            Some(failure) => self.strategy.compute_retry(attempt, failure),
        };
        match (decision, self.max_attempts) {
            (RetryDecision::Execute(_), Some(max)) if attempt >= max => RetryDecision::GiveUp,
            (decision, _) => decision,
        }
    }
}

pub type SupplierListener =
    Arc<dyn Fn(usize, Option<&TransactionOperationError>, &RetryDecision) + Send + Sync>;

/// Reports every decision of the wrapped supplier to its listeners. A
/// panicking listener is logged and does not change the decision.
pub struct ObservedSupplier {
    inner: Arc<dyn TransactionOptionSupplier>,
    listeners: Vec<SupplierListener>,
}

impl ObservedSupplier {
    pub fn new(inner: Arc<dyn TransactionOptionSupplier>) -> Self {
        Self {
            inner,
            listeners: Vec::new(),
        }
    }

    pub fn with_listener(mut self, listener: SupplierListener) -> Self {
        self.listeners.push(listener);
        self
    }
}

impl TransactionOptionSupplier for ObservedSupplier {
    fn next(
        &self,
        attempt: usize,
        previous_failure: Option<&TransactionOperationError>,
    ) -> RetryDecision {
        let decision = self.inner.next(attempt, previous_failure);
        for listener in &self.listeners {
            let notified =
                catch_unwind(AssertUnwindSafe(|| listener(attempt, previous_failure, &decision)));
            if notified.is_err() {
                tracing::warn!(attempt, "option supplier listener panicked");
            }
        }
        decision
    }
}
