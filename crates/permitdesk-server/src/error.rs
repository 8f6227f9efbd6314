use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use permitdesk_auth::AuthError;
use permitdesk_storage::DbError;
use serde_json::json;

/// Errors returned by request handlers.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Db(#[from] DbError),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            Self::Auth(e) => return e.into_response(),
            Self::Db(ref e) if e.is_infrastructure() => {
                tracing::error!(error = %e, "Database unreachable");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "service_unavailable",
                    "service unavailable".to_string(),
                )
            }
            Self::Db(ref e) => {
                tracing::error!(error = %e, "Statement failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "internal error".to_string(),
                )
            }
            Self::BadRequest(message) => (StatusCode::BAD_REQUEST, "bad_request", message),
            Self::NotFound(message) => (StatusCode::NOT_FOUND, "not_found", message),
        };

        (status, Json(json!({ "error": code, "message": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (ApiError::from(DbError::connection_unavailable("refused")), StatusCode::SERVICE_UNAVAILABLE),
            (ApiError::from(DbError::statement_failed("syntax")), StatusCode::INTERNAL_SERVER_ERROR),
            (ApiError::from(AuthError::invalid_credential("expired")), StatusCode::UNAUTHORIZED),
            (ApiError::BadRequest("phone must not be empty".into()), StatusCode::BAD_REQUEST),
            (ApiError::NotFound("gone".into()), StatusCode::NOT_FOUND),
        ];

        for (error, expected) in cases {
            assert_eq!(error.into_response().status(), expected);
        }
    }
}
