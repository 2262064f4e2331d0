pub mod command;
pub mod session;
pub mod sqlx_transaction;
