//! Error types for unidb core.

use thiserror::Error;
use unidb_codec::CodecError;
use unidb_driver::DriverError;

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while compiling a condition for a backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    /// The condition tree is not well formed.
    #[error("malformed condition: {message}")]
    Malformed {
        /// What is wrong with the condition.
        message: String,
    },

    /// The backend has no equivalent for an operator.
    #[error("operator {operator} is not supported by {backend}")]
    UnsupportedOperator {
        /// Operator token.
        operator: String,
        /// Backend name.
        backend: String,
    },

    /// The backend has no equivalent for a query feature.
    #[error("{feature} is not supported by {backend}")]
    Unsupported {
        /// Feature name.
        feature: String,
        /// Backend name.
        backend: String,
    },
}

impl CompileError {
    /// Creates a malformed condition error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed {
            message: message.into(),
        }
    }

    /// Creates an unsupported operator error.
    pub fn unsupported_operator(operator: impl Into<String>, backend: impl Into<String>) -> Self {
        Self::UnsupportedOperator {
            operator: operator.into(),
            backend: backend.into(),
        }
    }

    /// Creates an unsupported feature error.
    pub fn unsupported(feature: impl Into<String>, backend: impl Into<String>) -> Self {
        Self::Unsupported {
            feature: feature.into(),
            backend: backend.into(),
        }
    }
}

/// Errors that can occur in unidb core operations.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// A condition could not be compiled.
    #[error(transparent)]
    Compile(#[from] CompileError),

    /// A value could not be marshaled or unmarshaled.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// A single-row fetch matched nothing.
    #[error("no rows in result set")]
    NoRows,

    /// The driver reported an error.
    #[error("driver error: {0}")]
    Driver(#[from] DriverError),

    /// The transaction can no longer be used.
    #[error("transaction aborted: {reason}")]
    TransactionAborted {
        /// Reason for abort.
        reason: String,
    },

    /// A cursor was advanced after it reported the end of its rows.
    #[error("cursor already exhausted")]
    CursorExhausted,

    /// The session is closed.
    #[error("session is closed")]
    SessionClosed,

    /// Operation not permitted in current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why operation is invalid.
        message: String,
    },
}

impl Error {
    /// Creates a transaction aborted error.
    pub fn transaction_aborted(reason: impl Into<String>) -> Self {
        Self::TransactionAborted {
            reason: reason.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Returns true for the dedicated "no rows" error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NoRows)
    }

    /// Returns true if the connection that produced this error is unusable.
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Driver(e) if e.is_connection())
    }

    /// Returns true if the caller's context was canceled or timed out.
    pub fn is_canceled(&self) -> bool {
        matches!(self, Self::Driver(e) if e.is_canceled())
    }
}
