use std::borrow::Cow;
use std::fmt;

/// Code reported by the database alongside a failed transaction operation.
///
/// The orchestrator never interprets a code beyond comparing it for equality,
/// so anything the session layer reports can be carried verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DiagnosticCode(Cow<'static, str>);

impl DiagnosticCode {
    // concurrency control aborts
    pub const OCC_READ_CONFLICT: Self = Self::from_static("OCC_READ_CONFLICT");
    pub const OCC_WRITE_CONFLICT: Self = Self::from_static("OCC_WRITE_CONFLICT");
    pub const WRITE_WRITE_CONFLICT: Self = Self::from_static("WRITE_WRITE_CONFLICT");
    pub const WRITE_PRESERVE_CONFLICT: Self = Self::from_static("WRITE_PRESERVE_CONFLICT");
    pub const LTX_READ_CONFLICT: Self = Self::from_static("LTX_READ_CONFLICT");
    pub const LTX_WRITE_CONFLICT: Self = Self::from_static("LTX_WRITE_CONFLICT");
    pub const RTX_CONFLICT: Self = Self::from_static("RTX_CONFLICT");
    pub const BLOCKED_BY_CONCURRENT_OPERATION: Self =
        Self::from_static("BLOCKED_BY_CONCURRENT_OPERATION");
    pub const SERIALIZATION_FAILURE: Self = Self::from_static("SERIALIZATION_FAILURE");
    pub const DEADLOCK_DETECTED: Self = Self::from_static("DEADLOCK_DETECTED");
    pub const ABORTED_RETRYABLE: Self = Self::from_static("ABORTED_RETRYABLE");

    // administrative aborts, not retried unless a classifier opts in
    pub const ABORTED: Self = Self::from_static("ABORTED");
    pub const INACTIVE_TRANSACTION: Self = Self::from_static("INACTIVE_TRANSACTION");
    pub const LOCK_NOT_AVAILABLE: Self = Self::from_static("LOCK_NOT_AVAILABLE");

    // logical errors
    pub const SYNTAX_ERROR: Self = Self::from_static("SYNTAX_ERROR");
    pub const UNIQUE_VIOLATION: Self = Self::from_static("UNIQUE_VIOLATION");
    pub const CONSTRAINT_VIOLATION: Self = Self::from_static("CONSTRAINT_VIOLATION");
    pub const QUERY_CANCELED: Self = Self::from_static("QUERY_CANCELED");

    pub const fn from_static(code: &'static str) -> Self {
        Self(Cow::Borrowed(code))
    }

    pub fn new(code: impl Into<String>) -> Self {
        Self(Cow::Owned(code.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&'static str> for DiagnosticCode {
    fn from(code: &'static str) -> Self {
        Self::from_static(code)
    }
}
