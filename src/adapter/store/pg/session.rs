use async_trait::async_trait;
use sqlx::PgPool;
use std::time::Duration;

use crate::adapter::store::pg::sqlx_transaction::{map_sqlx_error, SqlxTransaction};
use crate::core::domain::session::Session;
use crate::core::domain::transaction::{TransactionError, TransactionWrapper};
use crate::core::domain::transaction_option::{TransactionMode, TransactionOption};

/// Opens Postgres transactions shaped after the requested option.
///
/// All modes run `SERIALIZABLE` so that conflicts surface as retryable
/// serialization failures. A long transaction locks its write preserve
/// tables upfront; read areas and priority have no Postgres counterpart and
/// are ignored.
pub struct PgSession {
    pool: PgPool,
}

impl PgSession {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Session for PgSession {
    async fn begin(
        &self,
        option: &TransactionOption,
        _timeout: Option<Duration>,
    ) -> Result<Box<dyn TransactionWrapper>, TransactionError> {
        let mut transaction = self.pool.begin().await.map_err(map_sqlx_error)?;

        sqlx::query(set_transaction_sql(option.mode()))
            .execute(&mut *transaction)
            .await
            .map_err(map_sqlx_error)?;

        if let Some(lock) = lock_tables_sql(option.write_preserve()) {
            sqlx::query(&lock)
                .execute(&mut *transaction)
                .await
                .map_err(map_sqlx_error)?;
        }

        if option.priority().is_some() {
            tracing::debug!(option = %option, "transaction priority ignored by postgres");
        }

        Ok(Box::new(SqlxTransaction::new(transaction, option.clone())))
    }
}

fn set_transaction_sql(mode: TransactionMode) -> &'static str {
    match mode {
        TransactionMode::Optimistic | TransactionMode::Long => {
            "SET TRANSACTION ISOLATION LEVEL SERIALIZABLE, READ WRITE"
        }
        TransactionMode::ReadOnly => {
            "SET TRANSACTION ISOLATION LEVEL SERIALIZABLE, READ ONLY, DEFERRABLE"
        }
    }
}

fn lock_tables_sql(tables: &[String]) -> Option<String> {
    if tables.is_empty() {
        return None;
    }
    let tables = tables
        .iter()
        .map(|table| quote_identifier(table))
        .collect::<Vec<_>>()
        .join(", ");
    Some(format!("LOCK TABLE {} IN SHARE ROW EXCLUSIVE MODE", tables))
}

fn quote_identifier(name: &str) -> String {
    name.split('.')
        .map(|part| format!("\"{}\"", part.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(".")
}
