use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;

use crate::adapter::web::app_state::AppState;
use crate::adapter::web::route::{transactions, users};

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/users", post(users::post))
        .route("/transactions/stats", get(transactions::stats))
        .with_state(state)
}
