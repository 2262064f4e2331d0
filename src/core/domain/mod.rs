pub mod cancellation;
pub mod command;
pub mod diagnostic_code;
pub mod entity;
pub mod execution_setting;
pub mod operation;
pub mod option_supplier;
pub mod retry_classifier;
pub mod session;
pub mod transaction;
pub mod transaction_counter;
pub mod transaction_event;
pub mod transaction_manager;
pub mod transaction_operation;
pub mod transaction_option;
