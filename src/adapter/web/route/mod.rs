pub mod transactions;
pub mod users;
