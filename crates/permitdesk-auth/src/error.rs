//! Authentication error types.

use permitdesk_storage::DbError;

use crate::jwt::JwtError;

/// Errors raised while authenticating a request.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Missing, malformed, wrongly signed or expired credential, or one
    /// without a subject.
    #[error("Invalid credential: {message}")]
    InvalidCredential { message: String },

    /// The credential is valid but no user record matches its subject.
    #[error("Principal not found: {subject}")]
    PrincipalNotFound { subject: String },

    /// Authenticated, but not allowed to perform the operation.
    #[error("Forbidden: {message}")]
    Forbidden { message: String },

    /// The user lookup failed.
    #[error(transparent)]
    Storage(#[from] DbError),
}

impl AuthError {
    /// Creates a new `InvalidCredential` error.
    #[must_use]
    pub fn invalid_credential(message: impl Into<String>) -> Self {
        Self::InvalidCredential {
            message: message.into(),
        }
    }

    /// Creates a new `PrincipalNotFound` error.
    #[must_use]
    pub fn principal_not_found(subject: impl Into<String>) -> Self {
        Self::PrincipalNotFound {
            subject: subject.into(),
        }
    }

    /// Creates a new `Forbidden` error.
    #[must_use]
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden {
            message: message.into(),
        }
    }

    /// Returns `true` when the caller failed to prove who they are.
    #[must_use]
    pub fn is_unauthenticated(&self) -> bool {
        matches!(
            self,
            Self::InvalidCredential { .. } | Self::PrincipalNotFound { .. }
        )
    }

    /// Returns `true` when no database connection could be obtained.
    #[must_use]
    pub fn is_infrastructure(&self) -> bool {
        matches!(self, Self::Storage(e) if e.is_infrastructure())
    }
}

impl From<JwtError> for AuthError {
    fn from(err: JwtError) -> Self {
        Self::invalid_credential(err.to_string())
    }
}
