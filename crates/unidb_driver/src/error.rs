//! Error types for driver operations.

use thiserror::Error;

/// Result type for driver operations.
pub type DriverResult<T> = Result<T, DriverError>;

/// Errors reported across the driver boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DriverError {
    /// The connection is broken and must be discarded.
    #[error("bad connection: {0}")]
    Connection(String),

    /// The caller's context was canceled.
    #[error("operation canceled")]
    Canceled,

    /// The caller's deadline passed.
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// The backend rejected the operation.
    #[error("{backend} error {code}: {message}")]
    Backend {
        /// Backend name.
        backend: String,
        /// Backend-specific error code.
        code: String,
        /// Backend message, verbatim.
        message: String,
    },

    /// A uniqueness or integrity constraint was violated.
    #[error("{backend} constraint violation: {message}")]
    Constraint {
        /// Backend name.
        backend: String,
        /// Backend message, verbatim.
        message: String,
    },

    /// The connection was closed by its owner.
    #[error("connection is closed")]
    Closed,

    /// A prepared statement handle is not known to the connection.
    #[error("unknown prepared statement {0}")]
    UnknownStatement(u64),

    /// Commit or rollback without an open transaction, or a nested begin.
    #[error("transaction state error: {0}")]
    TransactionState(String),
}

impl DriverError {
    /// Create a bad-connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection(message.into())
    }

    /// Create a backend error.
    pub fn backend(
        backend: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Backend {
            backend: backend.into(),
            code: code.into(),
            message: message.into(),
        }
    }

    /// Create a constraint violation error.
    pub fn constraint(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Constraint {
            backend: backend.into(),
            message: message.into(),
        }
    }

    /// Returns true if the connection that produced this error is unusable.
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection(_))
    }

    /// Returns true if the caller gave up (cancel or deadline).
    pub fn is_canceled(&self) -> bool {
        matches!(self, Self::Canceled | Self::DeadlineExceeded)
    }
}
