//! Error types for the PostgreSQL backend.

use permitdesk_storage::DbError;
use sqlx_core::error::Error as SqlxError;

/// Errors specific to the PostgreSQL backend.
#[derive(Debug, thiserror::Error)]
pub enum PostgresError {
    /// Error reported by sqlx (connection, protocol or database).
    #[error("Database error: {0}")]
    Sqlx(#[from] SqlxError),

    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Connection attempt exceeded the connect timeout.
    #[error("Connection timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
}

impl PostgresError {
    /// Creates a new configuration error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

impl From<PostgresError> for DbError {
    fn from(err: PostgresError) -> Self {
        match err {
            PostgresError::Sqlx(e) => map_sqlx_error(e),
            PostgresError::Config { message } => {
                DbError::connection_unavailable(format!("Configuration error: {message}"))
            }
            PostgresError::Timeout { timeout_ms } => {
                DbError::connection_unavailable(format!("connect timed out after {timeout_ms}ms"))
            }
        }
    }
}

/// Sorts a sqlx error into the storage taxonomy.
///
/// Rejections by the server keep their SQLSTATE; transport and pool failures
/// become `ConnectionUnavailable`.
pub fn map_sqlx_error(err: SqlxError) -> DbError {
    match err {
        SqlxError::Database(db_err) => DbError::StatementFailed {
            message: db_err.message().to_string(),
            code: db_err.code().map(|code| code.into_owned()),
        },
        SqlxError::Io(_)
        | SqlxError::Tls(_)
        | SqlxError::Protocol(_)
        | SqlxError::PoolTimedOut
        | SqlxError::PoolClosed
        | SqlxError::WorkerCrashed => DbError::connection_unavailable(err.to_string()),
        other => DbError::statement_failed(other.to_string()),
    }
}

/// Result type alias for PostgreSQL operations.
pub type Result<T> = std::result::Result<T, PostgresError>;
