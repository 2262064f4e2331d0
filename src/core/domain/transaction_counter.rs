use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::core::domain::transaction::TransactionPhase;
use crate::core::domain::transaction_event::{
    AttemptEnded, AttemptStarted, ListenerResult, RetryScheduled, TransactionEventListener,
    TransactionFinished,
};

const UNLABELED: &str = "<unlabeled>";

/// Event sink counting attempts and outcomes, in total and per option label.
/// Safe to share between concurrent `execute` calls.
#[derive(Debug, Default)]
pub struct TransactionCounter {
    begins: AtomicU64,
    commits: AtomicU64,
    retries: AtomicU64,
    body_failures: AtomicU64,
    commit_failures: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    by_label: Mutex<BTreeMap<String, LabelCount>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LabelCount {
    pub begins: u64,
    pub commits: u64,
    pub failures: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TransactionCounterSnapshot {
    pub begins: u64,
    pub commits: u64,
    pub retries: u64,
    pub body_failures: u64,
    pub commit_failures: u64,
    pub successes: u64,
    pub failures: u64,
    pub by_label: BTreeMap<String, LabelCount>,
}

impl TransactionCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> TransactionCounterSnapshot {
        let by_label = match self.by_label.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        TransactionCounterSnapshot {
            begins: self.begins.load(Ordering::Relaxed),
            commits: self.commits.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            body_failures: self.body_failures.load(Ordering::Relaxed),
            commit_failures: self.commit_failures.load(Ordering::Relaxed),
            successes: self.successes.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            by_label,
        }
    }

    fn update_label(&self, label: Option<&str>, update: impl FnOnce(&mut LabelCount)) {
        let mut by_label = match self.by_label.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let key = label.unwrap_or(UNLABELED);
        match by_label.get_mut(key) {
            Some(count) => update(count),
            None => {
                let mut count = LabelCount::default();
                update(&mut count);
                by_label.insert(key.to_string(), count);
            }
        }
    }
}

impl TransactionEventListener for TransactionCounter {
    fn on_attempt_start(&self, event: &AttemptStarted<'_>) -> ListenerResult {
        self.begins.fetch_add(1, Ordering::Relaxed);
        self.update_label(event.option.label(), |count| count.begins += 1);
        Ok(())
    }

    fn on_attempt_end(&self, event: &AttemptEnded<'_>) -> ListenerResult {
        match event.phase {
            None => {
                self.commits.fetch_add(1, Ordering::Relaxed);
                self.update_label(event.option.label(), |count| count.commits += 1);
            }
            Some(phase) => {
                match phase {
                    TransactionPhase::Body => {
                        self.body_failures.fetch_add(1, Ordering::Relaxed);
                    }
                    TransactionPhase::Commit => {
                        self.commit_failures.fetch_add(1, Ordering::Relaxed);
                    }
                    _ => {}
                }
                self.update_label(event.option.label(), |count| count.failures += 1);
            }
        }
        Ok(())
    }

    fn on_retry(&self, _event: &RetryScheduled<'_>) -> ListenerResult {
        self.retries.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn on_finish(&self, event: &TransactionFinished<'_>) -> ListenerResult {
        if event.is_success() {
            self.successes.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failures.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }
}
