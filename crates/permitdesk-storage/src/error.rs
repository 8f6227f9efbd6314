//! Error types for database access.
//!
//! Errors fall into two groups:
//!
//! - **infrastructure** ([`DbError::PoolUnavailable`],
//!   [`DbError::ConnectionUnavailable`]): no session could be obtained or the
//!   session broke. Read paths retry these once on a direct connection.
//! - **statement** ([`DbError::StatementFailed`],
//!   [`DbError::TransactionAborted`]): the database rejected the work. These
//!   surface immediately, after any rollback has been applied.

use std::fmt;

/// Errors that can occur while acquiring connections or running statements.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// The pooled path failed (pool missing or exhausted) and the direct
    /// fallback failed too.
    #[error("Connection pool unavailable: {message}")]
    PoolUnavailable {
        /// Description of both failures.
        message: String,
    },

    /// No connection could be obtained on the requested path, or an open
    /// session lost its connection.
    #[error("Connection unavailable: {message}")]
    ConnectionUnavailable {
        /// Description of the connection failure.
        message: String,
    },

    /// The database rejected the statement (syntax, integrity or constraint
    /// violation).
    #[error("Statement failed: {message}")]
    StatementFailed {
        /// Database-provided message.
        message: String,
        /// Backend error code (SQLSTATE for Postgres), when available.
        code: Option<String>,
    },

    /// A batch was rolled back because one of its statements failed.
    #[error("Transaction aborted at statement {index}: {source}")]
    TransactionAborted {
        /// Zero-based position of the failing statement in the batch.
        index: usize,
        /// The failure that caused the rollback.
        #[source]
        source: Box<DbError>,
    },
}

impl DbError {
    /// Creates a new `PoolUnavailable` error.
    #[must_use]
    pub fn pool_unavailable(message: impl Into<String>) -> Self {
        Self::PoolUnavailable {
            message: message.into(),
        }
    }

    /// Creates a new `ConnectionUnavailable` error.
    #[must_use]
    pub fn connection_unavailable(message: impl Into<String>) -> Self {
        Self::ConnectionUnavailable {
            message: message.into(),
        }
    }

    /// Creates a new `StatementFailed` error without a backend code.
    #[must_use]
    pub fn statement_failed(message: impl Into<String>) -> Self {
        Self::StatementFailed {
            message: message.into(),
            code: None,
        }
    }

    /// Creates a new `StatementFailed` error carrying a backend error code.
    #[must_use]
    pub fn statement_failed_with_code(
        message: impl Into<String>,
        code: impl Into<String>,
    ) -> Self {
        Self::StatementFailed {
            message: message.into(),
            code: Some(code.into()),
        }
    }

    /// Wraps `source` as the cause of a batch rollback.
    #[must_use]
    pub fn transaction_aborted(index: usize, source: DbError) -> Self {
        Self::TransactionAborted {
            index,
            source: Box::new(source),
        }
    }

    /// Returns `true` for failures to obtain or keep a connection.
    #[must_use]
    pub fn is_infrastructure(&self) -> bool {
        self.category() == ErrorCategory::Infrastructure
    }

    /// Returns the error category for logging/monitoring purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::PoolUnavailable { .. } | Self::ConnectionUnavailable { .. } => {
                ErrorCategory::Infrastructure
            }
            Self::StatementFailed { .. } => ErrorCategory::Statement,
            Self::TransactionAborted { .. } => ErrorCategory::Transaction,
        }
    }
}

/// Categories of database errors for logging and monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Connection or pool failure.
    Infrastructure,
    /// Rejected statement.
    Statement,
    /// Rolled-back batch.
    Transaction,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Infrastructure => write!(f, "infrastructure"),
            Self::Statement => write!(f, "statement"),
            Self::Transaction => write!(f, "transaction"),
        }
    }
}

/// Result type alias for database operations.
pub type DbResult<T> = std::result::Result<T, DbError>;
