use axum::extract::State;
use axum::Json;
use std::sync::Arc;

use crate::adapter::web::app_state::AppState;
use crate::core::domain::transaction_counter::TransactionCounterSnapshot;

pub async fn stats(State(state): State<Arc<AppState>>) -> Json<TransactionCounterSnapshot> {
    Json(state.transaction_counter.snapshot())
}
