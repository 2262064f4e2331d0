#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tx_orchestrator::core::domain::diagnostic_code::DiagnosticCode;
use tx_orchestrator::core::domain::operation::{Operation, OperationResult};
use tx_orchestrator::core::domain::retry_classifier::RetryClassification;
use tx_orchestrator::core::domain::session::Session;
use tx_orchestrator::core::domain::transaction::{
    CommitMode, TransactionError, TransactionPhase, TransactionWrapper,
};
use tx_orchestrator::core::domain::transaction_event::{
    AttemptEnded, AttemptStarted, ListenerResult, RetryScheduled, TransactionEventListener,
    TransactionFinished,
};
use tx_orchestrator::core::domain::transaction_operation::{
    TransactionAction, TransactionOperationError,
};
use tx_orchestrator::core::domain::transaction_option::TransactionOption;

/// What the scripted server does on each attempt, keyed by begin index.
#[derive(Default)]
pub struct Script {
    pub begin_failures: HashSet<usize>,
    pub commit_failures: HashMap<usize, DiagnosticCode>,
    pub rollback_failures: HashSet<usize>,
    pub begin_delay: Option<Duration>,
    pub commit_delay: Option<Duration>,
}

#[derive(Debug, Clone, Default)]
pub struct SessionStats {
    pub begins: usize,
    pub commits: usize,
    pub rollbacks: usize,
    pub closes: usize,
    pub open: usize,
    pub max_open: usize,
    pub options: Vec<TransactionOption>,
    pub operations: Vec<String>,
    pub committed_rows: i64,
}

struct Shared {
    script: Script,
    stats: Mutex<SessionStats>,
}

impl Shared {
    fn stats(&self) -> std::sync::MutexGuard<'_, SessionStats> {
        self.stats.lock().unwrap()
    }
}

pub struct ScriptedSession {
    shared: Arc<Shared>,
}

impl ScriptedSession {
    pub fn new(script: Script) -> Arc<Self> {
        Arc::new(Self {
            shared: Arc::new(Shared {
                script,
                stats: Mutex::new(SessionStats::default()),
            }),
        })
    }

    pub fn healthy() -> Arc<Self> {
        Self::new(Script::default())
    }

    pub fn stats(&self) -> SessionStats {
        self.shared.stats().clone()
    }
}

#[async_trait]
impl Session for ScriptedSession {
    async fn begin(
        &self,
        option: &TransactionOption,
        _timeout: Option<Duration>,
    ) -> Result<Box<dyn TransactionWrapper>, TransactionError> {
        let attempt = {
            let mut stats = self.shared.stats();
            stats.begins += 1;
            stats.options.push(option.clone());
            stats.begins - 1
        };
        if let Some(delay) = self.shared.script.begin_delay {
            tokio::time::sleep(delay).await;
        }
        if self.shared.script.begin_failures.contains(&attempt) {
            return Err(TransactionError::ConnectionError("server unreachable".to_string()));
        }
        {
            let mut stats = self.shared.stats();
            stats.open += 1;
            stats.max_open = stats.max_open.max(stats.open);
        }
        Ok(Box::new(ScriptedTransaction {
            shared: self.shared.clone(),
            attempt,
            option: option.clone(),
            pending_rows: 0,
            closed: false,
        }))
    }
}

struct ScriptedTransaction {
    shared: Arc<Shared>,
    attempt: usize,
    option: TransactionOption,
    pending_rows: i64,
    closed: bool,
}

impl ScriptedTransaction {
    fn mark_closed(&mut self) {
        if !self.closed {
            self.closed = true;
            self.shared.stats().open -= 1;
        }
    }
}

#[async_trait]
impl TransactionWrapper for ScriptedTransaction {
    fn option(&self) -> &TransactionOption {
        &self.option
    }

    fn is_closed(&self) -> bool {
        self.closed
    }

    async fn transaction_id(&mut self) -> Result<Option<String>, TransactionError> {
        Ok(Some(format!("TID-{:08}", self.attempt)))
    }

    async fn execute(&mut self, operation: &Operation) -> Result<OperationResult, TransactionError> {
        if self.closed {
            return Err(TransactionError::Closed);
        }
        self.shared.stats().operations.push(operation.sql().to_string());
        self.pending_rows += 1;
        Ok(OperationResult::affected(1))
    }

    async fn commit(
        &mut self,
        _mode: CommitMode,
        _timeout: Option<Duration>,
    ) -> Result<(), TransactionError> {
        if self.closed {
            return Err(TransactionError::Closed);
        }
        self.shared.stats().commits += 1;
        if let Some(delay) = self.shared.script.commit_delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(code) = self.shared.script.commit_failures.get(&self.attempt) {
            return Err(TransactionError::execution(code.clone(), "commit rejected"));
        }
        self.shared.stats().committed_rows += self.pending_rows;
        self.mark_closed();
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), TransactionError> {
        self.shared.stats().rollbacks += 1;
        self.mark_closed();
        if self.shared.script.rollback_failures.contains(&self.attempt) {
            return Err(TransactionError::ConnectionError("rollback lost".to_string()));
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransactionError> {
        if !self.closed {
            self.shared.stats().closes += 1;
            self.mark_closed();
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub enum Step {
    Succeed(i32),
    /// Fails with an optimistic write conflict.
    Conflict,
    /// Fails with the given diagnostic code.
    Code(DiagnosticCode),
    /// Fails with an error that carries no diagnostic code.
    Application,
    /// Closes the handle, then reports success.
    CloseAndSucceed,
    /// Never completes.
    Hang,
}

/// Runs one update per attempt, then does what the step for that attempt
/// says. The last step repeats once the script runs out.
pub struct ScriptedAction {
    steps: Vec<Step>,
    runs: AtomicUsize,
}

impl ScriptedAction {
    pub fn new(steps: impl Into<Vec<Step>>) -> Self {
        let steps = steps.into();
        assert!(!steps.is_empty());
        Self {
            steps,
            runs: AtomicUsize::new(0),
        }
    }

    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid business state")]
pub struct BusinessError;

#[async_trait]
impl TransactionAction<i32> for ScriptedAction {
    async fn execute(
        &self,
        transaction: &mut Box<dyn TransactionWrapper>,
    ) -> Result<i32, TransactionOperationError> {
        let run = self.runs.fetch_add(1, Ordering::SeqCst);
        let step = self.steps[run.min(self.steps.len() - 1)].clone();
        transaction
            .execute(&Operation::statement("UPDATE accounts SET balance = balance + 1"))
            .await?;
        match step {
            Step::Succeed(value) => Ok(value),
            Step::Conflict => Err(conflict()),
            Step::Code(code) => Err(TransactionError::execution(code, "scripted failure").into()),
            Step::Application => Err(TransactionOperationError::application(BusinessError)),
            Step::CloseAndSucceed => {
                transaction.close().await?;
                Ok(0)
            }
            Step::Hang => std::future::pending().await,
        }
    }
}

pub fn conflict() -> TransactionOperationError {
    TransactionError::execution(DiagnosticCode::OCC_WRITE_CONFLICT, "write conflict").into()
}

pub fn ltx() -> TransactionOption {
    TransactionOption::ltx(["accounts"]).unwrap()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recorded {
    Start(usize),
    End {
        attempt: usize,
        phase: Option<TransactionPhase>,
        classification: Option<RetryClassification>,
    },
    Retry(usize),
    Finish {
        attempt: Option<usize>,
        attempts: usize,
        success: bool,
    },
}

#[derive(Default)]
pub struct RecordingListener {
    events: Mutex<Vec<Recorded>>,
}

impl RecordingListener {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<Recorded> {
        self.events.lock().unwrap().clone()
    }

    pub fn starts(&self) -> usize {
        self.count(|event| matches!(event, Recorded::Start(_)))
    }

    pub fn ends(&self) -> usize {
        self.count(|event| matches!(event, Recorded::End { .. }))
    }

    pub fn finishes(&self) -> usize {
        self.count(|event| matches!(event, Recorded::Finish { .. }))
    }

    fn count(&self, predicate: impl Fn(&Recorded) -> bool) -> usize {
        self.events.lock().unwrap().iter().filter(|e| predicate(e)).count()
    }

    fn push(&self, event: Recorded) -> ListenerResult {
        self.events.lock().unwrap().push(event);
        Ok(())
    }
}

impl TransactionEventListener for RecordingListener {
    fn on_attempt_start(&self, event: &AttemptStarted<'_>) -> ListenerResult {
        self.push(Recorded::Start(event.attempt))
    }

    fn on_attempt_end(&self, event: &AttemptEnded<'_>) -> ListenerResult {
        self.push(Recorded::End {
            attempt: event.attempt,
            phase: event.phase,
            classification: event.classification,
        })
    }

    fn on_retry(&self, event: &RetryScheduled<'_>) -> ListenerResult {
        self.push(Recorded::Retry(event.attempt))
    }

    fn on_finish(&self, event: &TransactionFinished<'_>) -> ListenerResult {
        self.push(Recorded::Finish {
            attempt: event.attempt,
            attempts: event.attempts,
            success: event.is_success(),
        })
    }
}

/// Fails every notification.
pub struct FailingListener;

impl TransactionEventListener for FailingListener {
    fn on_attempt_start(&self, _event: &AttemptStarted<'_>) -> ListenerResult {
        Err("listener unavailable".into())
    }

    fn on_attempt_end(&self, _event: &AttemptEnded<'_>) -> ListenerResult {
        Err("listener unavailable".into())
    }

    fn on_finish(&self, _event: &TransactionFinished<'_>) -> ListenerResult {
        Err("listener unavailable".into())
    }
}

/// Panics on every notification.
pub struct PanickingListener;

impl TransactionEventListener for PanickingListener {
    fn on_attempt_start(&self, _event: &AttemptStarted<'_>) -> ListenerResult {
        panic!("listener bug")
    }

    fn on_attempt_end(&self, _event: &AttemptEnded<'_>) -> ListenerResult {
        panic!("listener bug")
    }

    fn on_retry(&self, _event: &RetryScheduled<'_>) -> ListenerResult {
        panic!("listener bug")
    }

    fn on_finish(&self, _event: &TransactionFinished<'_>) -> ListenerResult {
        panic!("listener bug")
    }
}
