use async_trait::async_trait;
use futures::future::BoxFuture;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use thiserror::Error;
use tracing::Instrument;

use crate::core::domain::cancellation::CancellationToken;
use crate::core::domain::execution_setting::ExecutionSetting;
use crate::core::domain::operation::{Operation, OperationResult};
use crate::core::domain::option_supplier::RetryDecision;
use crate::core::domain::retry_classifier::RetryClassification;
use crate::core::domain::session::Session;
use crate::core::domain::transaction::{TransactionError, TransactionPhase, TransactionWrapper};
use crate::core::domain::transaction_event::{
    AttemptEnded, AttemptStarted, EventDispatcher, RetryScheduled, TransactionEventListener,
    TransactionFinished,
};
use crate::core::domain::transaction_operation::{
    FnAction, TransactionAction, TransactionOperationError,
};
use crate::core::domain::transaction_option::TransactionOption;

const DDL_MAX_ATTEMPTS: usize = 3;

/// Failure of one attempt's body or commit, together with anything that
/// went wrong while releasing the transaction afterwards.
#[derive(Debug)]
pub struct AttemptFailure {
    pub phase: TransactionPhase,
    pub error: TransactionOperationError,
    /// Rollback and close failures, never used for classification.
    pub suppressed: Vec<TransactionError>,
}

impl fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed: {}", self.phase, self.error)?;
        if !self.suppressed.is_empty() {
            write!(f, " ({} suppressed)", self.suppressed.len())?;
        }
        Ok(())
    }
}

impl std::error::Error for AttemptFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

#[derive(Debug, Error)]
pub enum TransactionManagerError {
    #[error("Failed to begin transaction on attempt {attempt}: {source}")]
    BeginError {
        attempt: usize,
        #[source]
        source: TransactionError,
    },

    #[error("Transaction failed on attempt {attempt}: {failure}")]
    Fatal {
        attempt: usize,
        #[source]
        failure: AttemptFailure,
    },

    #[error("Transaction gave up after {attempts} attempts: {failure}")]
    RetryExhausted {
        attempts: usize,
        #[source]
        failure: AttemptFailure,
    },

    /// The supplier produced no usable option. `failure` is the failure of
    /// the last attempt when the problem showed up on a retry.
    #[error("No usable transaction option after {attempts} attempts: {message}")]
    Configuration {
        message: String,
        attempts: usize,
        #[source]
        failure: Option<AttemptFailure>,
    },

    #[error(
        "Transaction cancelled during {phase} on attempt {attempt} ({} suppressed)",
        .suppressed.len()
    )]
    Cancelled {
        phase: TransactionPhase,
        attempt: usize,
        suppressed: Vec<TransactionError>,
    },
}

impl TransactionManagerError {
    pub fn attempt_failure(&self) -> Option<&AttemptFailure> {
        match self {
            TransactionManagerError::Fatal { failure, .. }
            | TransactionManagerError::RetryExhausted { failure, .. } => Some(failure),
            TransactionManagerError::Configuration { failure, .. } => failure.as_ref(),
            _ => None,
        }
    }

    pub fn is_retry_exhausted(&self) -> bool {
        matches!(self, TransactionManagerError::RetryExhausted { .. })
    }
}

enum AttemptOutcome<T> {
    Committed(T),
    BeginFailed(TransactionError),
    Failed(AttemptFailure),
    Cancelled {
        phase: TransactionPhase,
        suppressed: Vec<TransactionError>,
    },
}

/// Runs transactional actions against a [`Session`], retrying retryable
/// failures with the options an [`ExecutionSetting`] supplies.
pub struct TransactionManager {
    session: Arc<dyn Session>,
    listeners: RwLock<Vec<Arc<dyn TransactionEventListener>>>,
}

impl TransactionManager {
    pub fn new(session: Arc<dyn Session>) -> Self {
        Self {
            session,
            listeners: RwLock::new(Vec::new()),
        }
    }

    /// Registers a listener notified for every call on this manager.
    pub fn add_event_listener(&self, listener: Arc<dyn TransactionEventListener>) {
        match self.listeners.write() {
            Ok(mut listeners) => listeners.push(listener),
            Err(poisoned) => poisoned.into_inner().push(listener),
        }
    }

    pub async fn execute<T, A>(
        &self,
        setting: &ExecutionSetting,
        action: &A,
    ) -> Result<T, TransactionManagerError>
    where
        T: Send + 'static,
        A: TransactionAction<T> + ?Sized,
    {
        self.run_attempts(setting, action, None).await
    }

    pub async fn run<A>(
        &self,
        setting: &ExecutionSetting,
        action: &A,
    ) -> Result<(), TransactionManagerError>
    where
        A: TransactionAction<()> + ?Sized,
    {
        self.run_attempts(setting, action, None).await
    }

    pub async fn execute_fn<T, F>(
        &self,
        setting: &ExecutionSetting,
        action: F,
    ) -> Result<T, TransactionManagerError>
    where
        T: Send + 'static,
        F: for<'a> Fn(
                &'a mut Box<dyn TransactionWrapper>,
            ) -> BoxFuture<'a, Result<T, TransactionOperationError>>
            + Send
            + Sync,
    {
        self.run_attempts(setting, &FnAction(action), None).await
    }

    /// Like [`execute`](Self::execute), but gives up with
    /// [`TransactionManagerError::Cancelled`] as soon as `token` is cancelled.
    pub async fn execute_cancellable<T, A>(
        &self,
        setting: &ExecutionSetting,
        action: &A,
        token: &CancellationToken,
    ) -> Result<T, TransactionManagerError>
    where
        T: Send + 'static,
        A: TransactionAction<T> + ?Sized,
    {
        self.run_attempts(setting, action, Some(token)).await
    }

    pub async fn execute_operation(
        &self,
        setting: &ExecutionSetting,
        operation: &Operation,
    ) -> Result<OperationResult, TransactionManagerError> {
        self.run_attempts(setting, &SingleOperation(operation), None)
            .await
    }

    /// Runs one DDL statement. Without a setting, the statement runs in a
    /// DDL transaction retried up to three times.
    pub async fn execute_ddl(
        &self,
        setting: Option<&ExecutionSetting>,
        ddl: &str,
    ) -> Result<(), TransactionManagerError> {
        let default_setting;
        let setting = match setting {
            Some(setting) => setting,
            None => {
                default_setting = default_ddl_setting();
                &default_setting
            }
        };
        let operation = Operation::statement(ddl);
        self.execute_operation(setting, &operation).await?;
        Ok(())
    }

    fn dispatcher(&self, setting: &ExecutionSetting) -> EventDispatcher {
        let mut listeners = match self.listeners.read() {
            Ok(listeners) => listeners.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        listeners.extend(setting.listeners().iter().cloned());
        EventDispatcher::new(listeners)
    }

    async fn run_attempts<T, A>(
        &self,
        setting: &ExecutionSetting,
        action: &A,
        cancel: Option<&CancellationToken>,
    ) -> Result<T, TransactionManagerError>
    where
        T: Send + 'static,
        A: TransactionAction<T> + ?Sized,
    {
        let span = tracing::debug_span!("transaction", label = setting.transaction_label());
        self.attempt_loop(setting, action, cancel)
            .instrument(span)
            .await
    }

    async fn attempt_loop<T, A>(
        &self,
        setting: &ExecutionSetting,
        action: &A,
        cancel: Option<&CancellationToken>,
    ) -> Result<T, TransactionManagerError>
    where
        T: Send + 'static,
        A: TransactionAction<T> + ?Sized,
    {
        let events = self.dispatcher(setting);
        let classifier = setting.retry_classifier();
        let supplier = setting.option_supplier();

        // every BEGIN advances `attempt`; only counted decisions advance `counted`
        let mut attempt = 0;
        let mut counted = 0;
        let mut previous: Option<AttemptFailure> = None;
        let mut last_option: Option<TransactionOption> = None;

        loop {
            if cancel.is_some_and(CancellationToken::is_cancelled) {
                let error = TransactionManagerError::Cancelled {
                    phase: TransactionPhase::Begin,
                    attempt,
                    suppressed: Vec::new(),
                };
                tracing::warn!(attempt, "transaction cancelled before begin");
                events.finished(&TransactionFinished {
                    attempt: attempt.checked_sub(1),
                    attempts: attempt,
                    option: last_option.as_ref(),
                    failure: Some(&error),
                });
                return Err(error);
            }

            let decision = supplier.next(counted, previous.as_ref().map(|failure| &failure.error));
            if let Some(failure) = &previous {
                if !matches!(decision, RetryDecision::GiveUp) {
                    events.retry_scheduled(&RetryScheduled {
                        attempt,
                        failure,
                        decision: &decision,
                    });
                }
            }

            let (option, counts) = match decision {
                RetryDecision::Execute(option) => (option, true),
                RetryDecision::ExecuteUncounted(option) => (option, false),
                RetryDecision::GiveUp => {
                    let error = match previous.take() {
                        None => TransactionManagerError::Configuration {
                            message: "option supplier gave up before the first attempt".to_string(),
                            attempts: 0,
                            failure: None,
                        },
                        Some(failure) => TransactionManagerError::RetryExhausted {
                            attempts: attempt,
                            failure,
                        },
                    };
                    tracing::error!(attempts = attempt, error = %error, "transaction gave up");
                    events.finished(&TransactionFinished {
                        attempt: attempt.checked_sub(1),
                        attempts: attempt,
                        option: last_option.as_ref(),
                        failure: Some(&error),
                    });
                    return Err(error);
                }
            };

            let option = setting.label_option(option);
            if let Err(invalid) = option.validate() {
                let error = TransactionManagerError::Configuration {
                    message: format!("invalid transaction option {}: {}", option, invalid),
                    attempts: attempt,
                    failure: previous.take(),
                };
                tracing::error!(attempt, error = %error, "transaction not started");
                events.finished(&TransactionFinished {
                    attempt: attempt.checked_sub(1),
                    attempts: attempt,
                    option: last_option.as_ref(),
                    failure: Some(&error),
                });
                return Err(error);
            }

            events.attempt_started(&AttemptStarted {
                attempt,
                option: &option,
            });
            tracing::debug!(
                attempt,
                label = option.label(),
                mode = %option.mode(),
                "transaction attempt started"
            );

            match self.run_attempt(setting, action, &option, cancel).await {
                AttemptOutcome::Committed(value) => {
                    events.attempt_ended(&AttemptEnded {
                        attempt,
                        option: &option,
                        phase: None,
                        failure: None,
                        classification: None,
                    });
                    tracing::debug!(attempt, label = option.label(), "transaction committed");
                    events.finished(&TransactionFinished {
                        attempt: Some(attempt),
                        attempts: attempt + 1,
                        option: Some(&option),
                        failure: None,
                    });
                    return Ok(value);
                }
                AttemptOutcome::BeginFailed(source) => {
                    events.attempt_ended(&AttemptEnded {
                        attempt,
                        option: &option,
                        phase: Some(TransactionPhase::Begin),
                        failure: Some(&source),
                        classification: None,
                    });
                    let error = TransactionManagerError::BeginError { attempt, source };
                    tracing::error!(attempt, error = %error, "transaction begin failed");
                    events.finished(&TransactionFinished {
                        attempt: Some(attempt),
                        attempts: attempt + 1,
                        option: Some(&option),
                        failure: Some(&error),
                    });
                    return Err(error);
                }
                AttemptOutcome::Cancelled { phase, suppressed } => {
                    let error = TransactionManagerError::Cancelled {
                        phase,
                        attempt,
                        suppressed,
                    };
                    events.attempt_ended(&AttemptEnded {
                        attempt,
                        option: &option,
                        phase: Some(phase),
                        failure: Some(&error),
                        classification: None,
                    });
                    tracing::warn!(attempt, %phase, "transaction cancelled");
                    events.finished(&TransactionFinished {
                        attempt: Some(attempt),
                        attempts: attempt + 1,
                        option: Some(&option),
                        failure: Some(&error),
                    });
                    return Err(error);
                }
                AttemptOutcome::Failed(failure) => {
                    let timed_out = failure
                        .error
                        .transaction_error()
                        .is_some_and(TransactionError::is_timeout);
                    let classification = if timed_out {
                        None
                    } else {
                        Some(classifier.classify(&failure.error))
                    };
                    events.attempt_ended(&AttemptEnded {
                        attempt,
                        option: &option,
                        phase: Some(failure.phase),
                        failure: Some(&failure.error),
                        classification,
                    });
                    for suppressed in &failure.suppressed {
                        tracing::warn!(attempt, error = %suppressed, "failed to release transaction");
                    }

                    if classification == Some(RetryClassification::Retryable) {
                        tracing::warn!(
                            attempt,
                            phase = %failure.phase,
                            code = failure.error.diagnostic_code().map(|code| code.as_str()),
                            error = %failure.error,
                            "retryable transaction failure"
                        );
                        previous = Some(failure);
                        last_option = Some(option);
                        if counts {
                            counted += 1;
                        }
                        attempt += 1;
                        continue;
                    }

                    let error = TransactionManagerError::Fatal { attempt, failure };
                    tracing::error!(attempt, error = %error, "transaction failed");
                    events.finished(&TransactionFinished {
                        attempt: Some(attempt),
                        attempts: attempt + 1,
                        option: Some(&option),
                        failure: Some(&error),
                    });
                    return Err(error);
                }
            }
        }
    }

    async fn run_attempt<T, A>(
        &self,
        setting: &ExecutionSetting,
        action: &A,
        option: &TransactionOption,
        cancel: Option<&CancellationToken>,
    ) -> AttemptOutcome<T>
    where
        T: Send + 'static,
        A: TransactionAction<T> + ?Sized,
    {
        let begin_timeout = setting.begin_timeout();
        let begin = with_timeout(
            TransactionPhase::Begin,
            begin_timeout,
            self.session.begin(option, begin_timeout),
        );
        let mut transaction = match until_cancelled(cancel, begin).await {
            Some(Ok(transaction)) => transaction,
            Some(Err(error)) => return AttemptOutcome::BeginFailed(error),
            None => {
                return AttemptOutcome::Cancelled {
                    phase: TransactionPhase::Begin,
                    suppressed: Vec::new(),
                }
            }
        };

        let (phase, error) = match until_cancelled(cancel, action.execute(&mut transaction)).await {
            None => {
                return AttemptOutcome::Cancelled {
                    phase: TransactionPhase::Body,
                    suppressed: close(&mut transaction).await,
                }
            }
            Some(Err(error)) => (TransactionPhase::Body, error),
            Some(Ok(_)) if transaction.is_closed() => {
                (TransactionPhase::Commit, TransactionError::Closed.into())
            }
            Some(Ok(value)) => {
                let commit_timeout = setting.commit_timeout();
                let commit = with_timeout(
                    TransactionPhase::Commit,
                    commit_timeout,
                    transaction.commit(setting.commit_mode(), commit_timeout),
                );
                match until_cancelled(cancel, commit).await {
                    Some(Ok(())) => {
                        for error in close(&mut transaction).await {
                            tracing::warn!(error = %error, "failed to close committed transaction");
                        }
                        return AttemptOutcome::Committed(value);
                    }
                    Some(Err(error)) => (TransactionPhase::Commit, error.into()),
                    None => {
                        return AttemptOutcome::Cancelled {
                            phase: TransactionPhase::Commit,
                            suppressed: close(&mut transaction).await,
                        }
                    }
                }
            }
        };

        AttemptOutcome::Failed(AttemptFailure {
            phase,
            error,
            suppressed: roll_back(&mut transaction).await,
        })
    }
}

/// Default setting for [`TransactionManager::execute_ddl`].
pub fn default_ddl_setting() -> ExecutionSetting {
    ExecutionSetting::always(TransactionOption::ddl().with_label("ddl"), Some(DDL_MAX_ATTEMPTS))
}

struct SingleOperation<'o>(&'o Operation);

#[async_trait]
impl<'o> TransactionAction<OperationResult> for SingleOperation<'o> {
    async fn execute(
        &self,
        transaction: &mut Box<dyn TransactionWrapper>,
    ) -> Result<OperationResult, TransactionOperationError> {
        Ok(transaction.execute(self.0).await?)
    }
}

/// Rolls back a still-open handle and makes sure it ends up closed.
async fn roll_back(transaction: &mut Box<dyn TransactionWrapper>) -> Vec<TransactionError> {
    let mut suppressed = Vec::new();
    if !transaction.is_closed() {
        if let Err(error) = transaction.rollback().await {
            suppressed.push(error);
        }
    }
    suppressed.extend(close(transaction).await);
    suppressed
}

async fn close(transaction: &mut Box<dyn TransactionWrapper>) -> Vec<TransactionError> {
    if transaction.is_closed() {
        return Vec::new();
    }
    match transaction.close().await {
        Ok(()) => Vec::new(),
        Err(error) => vec![error],
    }
}

async fn with_timeout<R, F>(
    phase: TransactionPhase,
    timeout: Option<Duration>,
    future: F,
) -> Result<R, TransactionError>
where
    F: Future<Output = Result<R, TransactionError>>,
{
    match timeout {
        None => future.await,
        Some(limit) => match tokio::time::timeout(limit, future).await {
            Ok(result) => result,
            Err(_) => Err(TransactionError::Timeout {
                phase,
                timeout: limit,
            }),
        },
    }
}

async fn until_cancelled<F: Future>(cancel: Option<&CancellationToken>, future: F) -> Option<F::Output> {
    match cancel {
        None => Some(future.await),
        Some(token) => {
            tokio::select! {
                biased;
                _ = token.cancelled() => None,
                output = future => Some(output),
            }
        }
    }
}
