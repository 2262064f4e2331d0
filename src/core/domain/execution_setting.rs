use std::sync::Arc;
use std::time::Duration;

use crate::core::domain::option_supplier::{
    AlwaysRetrySupplier, FixedSequenceSupplier, MultipleListSupplier, TransactionOptionSupplier,
};
use crate::core::domain::retry_classifier::{default_classifier, RetryClassifier};
use crate::core::domain::transaction::CommitMode;
use crate::core::domain::transaction_event::TransactionEventListener;
use crate::core::domain::transaction_option::TransactionOption;

/// Reusable configuration for `TransactionManager::execute`.
///
/// A running call only reads its setting; cloning is cheap and changing a
/// clone between calls does not affect calls already in flight.
#[derive(Clone)]
pub struct ExecutionSetting {
    option_supplier: Arc<dyn TransactionOptionSupplier>,
    retry_classifier: Option<Arc<dyn RetryClassifier>>,
    commit_mode: CommitMode,
    begin_timeout: Option<Duration>,
    commit_timeout: Option<Duration>,
    transaction_label: Option<String>,
    listeners: Vec<Arc<dyn TransactionEventListener>>,
}

impl ExecutionSetting {
    pub fn new(option_supplier: Arc<dyn TransactionOptionSupplier>) -> Self {
        Self {
            option_supplier,
            retry_classifier: None,
            commit_mode: CommitMode::default(),
            begin_timeout: None,
            commit_timeout: None,
            transaction_label: None,
            listeners: Vec::new(),
        }
    }

    pub fn of(options: impl IntoIterator<Item = TransactionOption>) -> Self {
        Self::new(Arc::new(FixedSequenceSupplier::new(options)))
    }

    pub fn always(option: TransactionOption, max_attempts: Option<usize>) -> Self {
        let supplier = AlwaysRetrySupplier::new(option);
        let supplier = match max_attempts {
            Some(max) => supplier.with_max_attempts(max),
            None => supplier,
        };
        Self::new(Arc::new(supplier))
    }

    pub fn multiple(supplier: MultipleListSupplier) -> Self {
        Self::new(Arc::new(supplier))
    }

    pub fn with_retry_classifier(mut self, classifier: Arc<dyn RetryClassifier>) -> Self {
        self.retry_classifier = Some(classifier);
        self
    }

    pub fn with_commit_mode(mut self, commit_mode: CommitMode) -> Self {
        self.commit_mode = commit_mode;
        self
    }

    pub fn with_begin_timeout(mut self, timeout: Duration) -> Self {
        self.begin_timeout = Some(timeout);
        self
    }

    pub fn with_commit_timeout(mut self, timeout: Duration) -> Self {
        self.commit_timeout = Some(timeout);
        self
    }

    /// Label applied to every option that does not carry its own.
    pub fn with_transaction_label(mut self, label: impl Into<String>) -> Self {
        self.transaction_label = Some(label.into());
        self
    }

    pub fn with_event_listener(mut self, listener: Arc<dyn TransactionEventListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    pub fn option_supplier(&self) -> &dyn TransactionOptionSupplier {
        self.option_supplier.as_ref()
    }

    /// The classifier for a call: the override if one is set, else the
    /// process-wide default.
    pub fn retry_classifier(&self) -> Arc<dyn RetryClassifier> {
        match &self.retry_classifier {
            Some(classifier) => classifier.clone(),
            None => default_classifier(),
        }
    }

    pub fn commit_mode(&self) -> CommitMode {
        self.commit_mode
    }

    pub fn begin_timeout(&self) -> Option<Duration> {
        self.begin_timeout
    }

    pub fn commit_timeout(&self) -> Option<Duration> {
        self.commit_timeout
    }

    pub fn transaction_label(&self) -> Option<&str> {
        self.transaction_label.as_deref()
    }

    pub fn listeners(&self) -> &[Arc<dyn TransactionEventListener>] {
        &self.listeners
    }

    pub(crate) fn label_option(&self, option: TransactionOption) -> TransactionOption {
        match (&self.transaction_label, option.label()) {
            (Some(label), None) => option.with_label(label.as_str()),
            _ => option,
        }
    }
}

impl std::fmt::Debug for ExecutionSetting {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionSetting")
            .field("commit_mode", &self.commit_mode)
            .field("begin_timeout", &self.begin_timeout)
            .field("commit_timeout", &self.commit_timeout)
            .field("transaction_label", &self.transaction_label)
            .field("custom_classifier", &self.retry_classifier.is_some())
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::domain::option_supplier::RetryDecision;

    #[test]
    fn transaction_label_fills_missing_labels_only() {
        let setting = ExecutionSetting::of([TransactionOption::occ()]).with_transaction_label("job");
        assert_eq!(setting.label_option(TransactionOption::occ()).label(), Some("job"));
        let own = TransactionOption::occ().with_label("own");
        assert_eq!(setting.label_option(own).label(), Some("own"));
    }

    #[test]
    fn always_setting_honours_max_attempts() {
        let setting = ExecutionSetting::always(TransactionOption::occ(), Some(1));
        assert!(matches!(setting.option_supplier().next(0, None), RetryDecision::Execute(_)));
        assert_eq!(setting.option_supplier().next(1, None), RetryDecision::GiveUp);
    }
}
