//! Client-side transaction execution with retries.
//!
//! [`TransactionManager`](crate::core::domain::transaction_manager::TransactionManager)
//! opens a transaction through a [`Session`](crate::core::domain::session::Session),
//! runs a caller-supplied action, commits or rolls back, and retries
//! retryable aborts under the options an
//! [`ExecutionSetting`](crate::core::domain::execution_setting::ExecutionSetting)
//! supplies. The `adapter` module wires it to Postgres and a small web service.

pub mod adapter;
pub mod core;
pub mod error;
