use axum::response::Response;
use std::sync::Arc;

use crate::core::domain::entity::user::user::UnvalidatedCreateUserInput;
use crate::core::port::create_user::CreateUserInputBoundary;

use crate::adapter::web::dto::create_user_web_input::CreateUserWebInput;
use crate::adapter::web::presenter::create_user::CreateUserPresenter;

pub struct UserHandler {
    use_case: Arc<dyn CreateUserInputBoundary>,
}

impl UserHandler {
    pub fn new(use_case: Arc<dyn CreateUserInputBoundary>) -> Self {
        Self { use_case }
    }

    /// Runs the use case; every outcome, including retry exhaustion, is
    /// rendered by the presenter.
    pub async fn create_user(&self, user: CreateUserWebInput) -> Response {
        let mut presenter = CreateUserPresenter::new();
        let input = UnvalidatedCreateUserInput::from(user);

        let result = self.use_case.execute(input, &mut presenter).await;
        presenter.present(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::http::{header, StatusCode};

    use crate::core::domain::diagnostic_code::DiagnosticCode;
    use crate::core::domain::transaction::{TransactionError, TransactionPhase};
    use crate::core::domain::transaction_manager::{AttemptFailure, TransactionManagerError};
    use crate::core::port::create_user::{CreateUserError, CreateUserOutputBoundary};

    enum Outcome {
        Created,
        Exhausted,
        Silent,
    }

    struct FakeUseCase(Outcome);

    #[async_trait]
    impl CreateUserInputBoundary for FakeUseCase {
        async fn execute(
            &self,
            input: UnvalidatedCreateUserInput,
            output_boundary: &mut dyn CreateUserOutputBoundary,
        ) -> Result<(), CreateUserError> {
            match self.0 {
                Outcome::Created => {
                    output_boundary.execute(input.id)?;
                    Ok(())
                }
                Outcome::Exhausted => Err(TransactionManagerError::RetryExhausted {
                    attempts: 4,
                    failure: AttemptFailure {
                        phase: TransactionPhase::Commit,
                        error: TransactionError::execution(
                            DiagnosticCode::SERIALIZATION_FAILURE,
                            "could not serialize access",
                        )
                        .into(),
                        suppressed: Vec::new(),
                    },
                }
                .into()),
                Outcome::Silent => Ok(()),
            }
        }
    }

    fn request() -> CreateUserWebInput {
        CreateUserWebInput {
            id: 5,
            name: "Lin".to_string(),
            email: "lin@example.com".to_string(),
        }
    }

    #[tokio::test]
    async fn created_user_gets_a_location() {
        let handler = UserHandler::new(Arc::new(FakeUseCase(Outcome::Created)));
        let response = handler.create_user(request()).await;
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers()[header::LOCATION], "/users/5");
    }

    #[tokio::test]
    async fn exhausted_retries_are_service_unavailable() {
        let handler = UserHandler::new(Arc::new(FakeUseCase(Outcome::Exhausted)));
        let response = handler.create_user(request()).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn missing_output_is_a_server_error() {
        let handler = UserHandler::new(Arc::new(FakeUseCase(Outcome::Silent)));
        let response = handler.create_user(request()).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
