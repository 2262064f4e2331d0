use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{Column, Postgres, Row as _, Transaction, TypeInfo};
use std::time::Duration;

use crate::core::domain::diagnostic_code::DiagnosticCode;
use crate::core::domain::operation::{Operation, OperationKind, OperationResult, Row, SqlValue};
use crate::core::domain::transaction::{CommitMode, TransactionError, TransactionWrapper};
use crate::core::domain::transaction_option::TransactionOption;

pub struct SqlxTransaction {
    transaction: Option<Transaction<'static, Postgres>>,
    option: TransactionOption,
    transaction_id: Option<String>,
}

impl SqlxTransaction {
    pub fn new(transaction: Transaction<'static, Postgres>, option: TransactionOption) -> Self {
        Self {
            transaction: Some(transaction),
            option,
            transaction_id: None,
        }
    }

    fn open(&mut self) -> Result<&mut Transaction<'static, Postgres>, TransactionError> {
        self.transaction.as_mut().ok_or(TransactionError::Closed)
    }
}

#[async_trait]
impl TransactionWrapper for SqlxTransaction {
    fn option(&self) -> &TransactionOption {
        &self.option
    }

    fn is_closed(&self) -> bool {
        self.transaction.is_none()
    }

    async fn transaction_id(&mut self) -> Result<Option<String>, TransactionError> {
        if self.transaction_id.is_none() {
            let transaction = self.open()?;
            let row = sqlx::query("SELECT pg_current_xact_id_if_assigned()::text")
                .fetch_one(&mut **transaction)
                .await
                .map_err(map_sqlx_error)?;
            self.transaction_id = row.try_get::<Option<String>, _>(0).map_err(map_sqlx_error)?;
        }
        Ok(self.transaction_id.clone())
    }

    async fn execute(&mut self, operation: &Operation) -> Result<OperationResult, TransactionError> {
        let transaction = self.open()?;
        let mut sqlx_query = sqlx::query(operation.sql());

        for param in operation.params() {
            if param.is_null() {
                sqlx_query = sqlx_query.bind(None::<String>);
            } else if let Some(value) = param.as_i32() {
                sqlx_query = sqlx_query.bind(value);
            } else if let Some(value) = param.as_i64() {
                sqlx_query = sqlx_query.bind(value);
            } else if let Some(value) = param.as_bool() {
                sqlx_query = sqlx_query.bind(value);
            } else if let Some(value) = param.as_string() {
                sqlx_query = sqlx_query.bind(value);
            } else {
                return Err(TransactionError::BindError(format!(
                    "Unsupported parameter type: {:?}",
                    param
                )));
            }
        }

        match operation.kind() {
            OperationKind::Statement => {
                let result = sqlx_query
                    .execute(&mut **transaction)
                    .await
                    .map_err(map_sqlx_error)?;
                Ok(OperationResult::affected(result.rows_affected()))
            }
            OperationKind::Query => {
                let rows = sqlx_query
                    .fetch_all(&mut **transaction)
                    .await
                    .map_err(map_sqlx_error)?;
                let rows = rows.iter().map(decode_row).collect::<Result<Vec<_>, _>>()?;
                Ok(OperationResult::with_rows(rows))
            }
        }
    }

    async fn commit(
        &mut self,
        mode: CommitMode,
        _timeout: Option<Duration>,
    ) -> Result<(), TransactionError> {
        if let Some(setting) = synchronous_commit(mode) {
            let transaction = self.open()?;
            sqlx::query(setting)
                .execute(&mut **transaction)
                .await
                .map_err(map_sqlx_error)?;
        }
        let transaction = self.transaction.take().ok_or(TransactionError::Closed)?;
        transaction.commit().await.map_err(map_sqlx_error)
    }

    async fn rollback(&mut self) -> Result<(), TransactionError> {
        let transaction = self.transaction.take().ok_or(TransactionError::Closed)?;
        transaction.rollback().await.map_err(map_sqlx_error)
    }

    async fn close(&mut self) -> Result<(), TransactionError> {
        // dropping an unfinished sqlx transaction queues its rollback
        drop(self.transaction.take());
        Ok(())
    }
}

fn synchronous_commit(mode: CommitMode) -> Option<&'static str> {
    match mode {
        CommitMode::Default => None,
        CommitMode::Accepted => Some("SET LOCAL synchronous_commit = off"),
        CommitMode::Available => Some("SET LOCAL synchronous_commit = local"),
        CommitMode::Stored => Some("SET LOCAL synchronous_commit = on"),
        CommitMode::Propagated => Some("SET LOCAL synchronous_commit = remote_apply"),
    }
}

pub(crate) fn map_sqlx_error(error: sqlx::Error) -> TransactionError {
    match error {
        sqlx::Error::Database(db) => {
            let code = match db.code() {
                Some(sqlstate) => pg_diagnostic_code(&sqlstate),
                None => DiagnosticCode::new("UNKNOWN"),
            };
            TransactionError::execution(code, db.message())
        }
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => TransactionError::ConnectionError(error.to_string()),
        sqlx::Error::ColumnDecode { index, source } => TransactionError::DecodeError {
            column: index,
            message: source.to_string(),
        },
        other => TransactionError::ConnectionError(other.to_string()),
    }
}

/// Maps a Postgres SQLSTATE onto the orchestrator's diagnostic codes.
pub(crate) fn pg_diagnostic_code(sqlstate: &str) -> DiagnosticCode {
    match sqlstate {
        "40001" => DiagnosticCode::SERIALIZATION_FAILURE,
        "40P01" => DiagnosticCode::DEADLOCK_DETECTED,
        "55P03" => DiagnosticCode::LOCK_NOT_AVAILABLE,
        "25P02" => DiagnosticCode::INACTIVE_TRANSACTION,
        "57014" => DiagnosticCode::QUERY_CANCELED,
        "23505" => DiagnosticCode::UNIQUE_VIOLATION,
        state if state.starts_with("23") => DiagnosticCode::CONSTRAINT_VIOLATION,
        state if state.starts_with("42") => DiagnosticCode::SYNTAX_ERROR,
        state => DiagnosticCode::new(state),
    }
}

fn decode_row(row: &PgRow) -> Result<Row, TransactionError> {
    row.columns()
        .iter()
        .map(|column| {
            let value = decode_column(row, column.ordinal(), column.type_info().name()).map_err(
                |e| TransactionError::DecodeError {
                    column: column.name().to_string(),
                    message: e.to_string(),
                },
            )?;
            Ok((column.name().to_string(), value))
        })
        .collect()
}

fn decode_column(row: &PgRow, index: usize, type_name: &str) -> Result<SqlValue, sqlx::Error> {
    let value = match type_name {
        "INT2" => row
            .try_get::<Option<i16>, _>(index)?
            .map(|v| SqlValue::Int(v.into())),
        "INT4" => row
            .try_get::<Option<i32>, _>(index)?
            .map(|v| SqlValue::Int(v.into())),
        "INT8" => row.try_get::<Option<i64>, _>(index)?.map(SqlValue::Int),
        "BOOL" => row.try_get::<Option<bool>, _>(index)?.map(SqlValue::Bool),
        _ => row.try_get::<Option<String>, _>(index)?.map(SqlValue::Text),
    };
    Ok(value.unwrap_or(SqlValue::Null))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sqlstates_map_to_diagnostic_codes() {
        assert_eq!(pg_diagnostic_code("40001"), DiagnosticCode::SERIALIZATION_FAILURE);
        assert_eq!(pg_diagnostic_code("40P01"), DiagnosticCode::DEADLOCK_DETECTED);
        assert_eq!(pg_diagnostic_code("23503"), DiagnosticCode::CONSTRAINT_VIOLATION);
        assert_eq!(pg_diagnostic_code("42P01"), DiagnosticCode::SYNTAX_ERROR);
        assert_eq!(pg_diagnostic_code("08006"), DiagnosticCode::new("08006"));
    }

    #[test]
    fn default_commit_mode_leaves_the_server_setting() {
        assert_eq!(synchronous_commit(CommitMode::Default), None);
        assert_eq!(
            synchronous_commit(CommitMode::Propagated),
            Some("SET LOCAL synchronous_commit = remote_apply")
        );
    }
}
