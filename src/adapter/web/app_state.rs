use std::sync::Arc;

use crate::core::domain::transaction_counter::TransactionCounter;
use crate::core::port::create_user::CreateUserInputBoundary;

pub struct AppState {
    pub transaction_counter: Arc<TransactionCounter>,
    pub user_create_use_case: Arc<dyn CreateUserInputBoundary>,
}
