//! `IntoResponse` for [`AuthError`].
//!
//! Clients only ever see a generic reason; details stay in the logs.

use axum::Json;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::error::AuthError;

const WWW_AUTHENTICATE: &str = "Bearer realm=\"permitdesk\"";

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, code, message) = error_details(&self);

        if status.is_server_error() {
            tracing::error!(error = %self, "Authentication failed on storage");
        } else {
            tracing::debug!(error = %self, "Authentication rejected");
        }

        let body = Json(json!({ "error": code, "message": message }));
        let mut response = (status, body).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response.headers_mut().insert(
                header::WWW_AUTHENTICATE,
                HeaderValue::from_static(WWW_AUTHENTICATE),
            );
        }
        response
    }
}

/// Returns (HTTP status, error code, client-facing message).
fn error_details(error: &AuthError) -> (StatusCode, &'static str, &'static str) {
    match error {
        AuthError::InvalidCredential { .. } | AuthError::PrincipalNotFound { .. } => (
            StatusCode::UNAUTHORIZED,
            "not_authenticated",
            "not authenticated",
        ),
        AuthError::Forbidden { .. } => (StatusCode::FORBIDDEN, "forbidden", "access denied"),
        AuthError::Storage(e) if e.is_infrastructure() => (
            StatusCode::SERVICE_UNAVAILABLE,
            "service_unavailable",
            "service unavailable",
        ),
        AuthError::Storage(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal_error",
            "internal error",
        ),
    }
}
