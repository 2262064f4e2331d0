use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::core::domain::command::CommandError;
use crate::core::domain::transaction_manager::TransactionManagerError;
use crate::core::domain::transaction_operation::TransactionOperationError;
use crate::core::port::create_user::{
    CreateUserError, CreateUserOutputBoundary, CreateUserOutputError,
};

#[derive(Debug, Serialize)]
pub struct CreatedUser {
    pub id: i32,
}

#[derive(Default)]
pub struct CreateUserPresenter {
    pub(crate) output: Option<i32>,
}

impl CreateUserPresenter {
    pub fn new() -> Self {
        Self { output: None }
    }

    /// Turns the use case outcome into the HTTP response.
    pub(crate) fn present(&self, result: Result<(), CreateUserError>) -> Response {
        match (result, self.output) {
            (Ok(()), Some(id)) => self.success(id),
            (Ok(()), None) => {
                tracing::error!("create user finished without an output");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Output not set by presenter".to_string(),
                )
                    .into_response()
            }
            (Err(error), _) => {
                let (status, message) = self.failure(error);
                if status.is_server_error() {
                    tracing::error!(%status, error = %message, "create user failed");
                } else {
                    tracing::info!(%status, error = %message, "create user rejected");
                }
                (status, message).into_response()
            }
        }
    }

    pub(crate) fn success(&self, id: i32) -> Response {
        (
            StatusCode::CREATED,
            [(header::LOCATION, format!("/users/{}", id))],
            Json(CreatedUser { id }),
        )
            .into_response()
    }

    pub(crate) fn failure(&self, error: CreateUserError) -> (StatusCode, String) {
        let status = match &error {
            CreateUserError::ValidationError(_) => StatusCode::BAD_REQUEST,
            CreateUserError::TransactionError(TransactionManagerError::RetryExhausted { .. }) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            CreateUserError::TransactionError(e) => match e.attempt_failure().map(|f| &f.error) {
                Some(TransactionOperationError::CommandError(CommandError::AlreadyExists {
                    ..
                })) => StatusCode::CONFLICT,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            CreateUserError::OutputError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, format!("Failed to create user: {}", error))
    }
}

impl CreateUserOutputBoundary for CreateUserPresenter {
    fn execute(&mut self, output: i32) -> Result<(), CreateUserOutputError> {
        if let Some(previous) = self.output {
            return Err(CreateUserOutputError::InvalidStateError(format!(
                "output already set to {}",
                previous
            )));
        }
        self.output = Some(output);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::domain::entity::user::user::CreateUserValidationError;
    use crate::core::domain::transaction::{TransactionError, TransactionPhase};
    use crate::core::domain::transaction_manager::AttemptFailure;

    fn failed(error: TransactionOperationError) -> CreateUserError {
        CreateUserError::TransactionError(TransactionManagerError::Fatal {
            attempt: 0,
            failure: AttemptFailure {
                phase: TransactionPhase::Body,
                error,
                suppressed: Vec::new(),
            },
        })
    }

    #[test]
    fn maps_failures_to_status_codes() {
        let presenter = CreateUserPresenter::new();
        assert_eq!(
            presenter
                .failure(CreateUserValidationError::EmptyName.into())
                .0,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            presenter
                .failure(failed(CommandError::user_already_exists(1).into()))
                .0,
            StatusCode::CONFLICT
        );
        assert_eq!(
            presenter
                .failure(failed(TransactionError::ConnectionError("down".into()).into()))
                .0,
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn output_can_only_be_set_once() {
        let mut presenter = CreateUserPresenter::new();
        presenter.execute(3).unwrap();
        assert!(presenter.execute(4).is_err());
        assert_eq!(presenter.output, Some(3));
    }
}
