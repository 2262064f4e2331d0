use serde::Serialize;

pub trait ToSql: Send + Sync + std::fmt::Debug {
    fn is_null(&self) -> bool {
        false
    }
    fn as_i32(&self) -> Option<i32> {
        None
    }
    fn as_i64(&self) -> Option<i64> {
        None
    }
    fn as_bool(&self) -> Option<bool> {
        None
    }
    fn as_string(&self) -> Option<String> {
        None
    }
}

impl ToSql for i32 {
    fn as_i32(&self) -> Option<i32> {
        Some(*self)
    }
}

impl ToSql for i64 {
    fn as_i64(&self) -> Option<i64> {
        Some(*self)
    }
}

impl ToSql for bool {
    fn as_bool(&self) -> Option<bool> {
        Some(*self)
    }
}

impl ToSql for String {
    fn as_string(&self) -> Option<String> {
        Some(self.clone())
    }
}

impl ToSql for &'static str {
    fn as_string(&self) -> Option<String> {
        Some((*self).to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SqlValue {
    Null,
    Int(i64),
    Bool(bool),
    Text(String),
}

impl ToSql for SqlValue {
    fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }
    fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::Int(value) => Some(*value),
            _ => None,
        }
    }
    fn as_bool(&self) -> Option<bool> {
        match self {
            SqlValue::Bool(value) => Some(*value),
            _ => None,
        }
    }
    fn as_string(&self) -> Option<String> {
        match self {
            SqlValue::Text(value) => Some(value.clone()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    /// Returns an affected-row count.
    Statement,
    /// Returns rows.
    Query,
}

/// One SQL operation run against an open transaction. The orchestrator only
/// hands it to the handle and never looks inside.
#[derive(Debug)]
pub struct Operation {
    sql: String,
    params: Vec<Box<dyn ToSql>>,
    kind: OperationKind,
}

impl Operation {
    pub fn statement(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
            kind: OperationKind::Statement,
        }
    }

    pub fn query(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
            kind: OperationKind::Query,
        }
    }

    pub fn bind<P: ToSql + 'static>(mut self, param: P) -> Self {
        self.params.push(Box::new(param));
        self
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[Box<dyn ToSql>] {
        &self.params
    }

    pub fn kind(&self) -> OperationKind {
        self.kind
    }
}

pub type Row = Vec<(String, SqlValue)>;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OperationResult {
    pub rows_affected: u64,
    pub rows: Vec<Row>,
}

impl OperationResult {
    pub fn affected(rows_affected: u64) -> Self {
        Self {
            rows_affected,
            rows: Vec::new(),
        }
    }

    pub fn with_rows(rows: Vec<Row>) -> Self {
        Self {
            rows_affected: 0,
            rows,
        }
    }
}
