use axum::extract::State;
use axum::response::Response;
use axum::Json;
use std::sync::Arc;
use tracing::Instrument;

use crate::adapter::web::app_state::AppState;
use crate::adapter::web::dto::create_user_web_input::CreateUserWebInput;
use crate::adapter::web::handler::users::post::UserHandler;

pub async fn post(
    State(state): State<Arc<AppState>>,
    Json(user): Json<CreateUserWebInput>,
) -> Response {
    let span = tracing::info_span!("create_user", user_id = user.id);
    let handler = UserHandler::new(state.user_create_use_case.clone());
    handler.create_user(user).instrument(span).await
}
