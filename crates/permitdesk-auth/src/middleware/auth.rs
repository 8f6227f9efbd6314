//! Bearer credential extractor.
//!
//! ```ignore
//! async fn me(BearerAuth(principal): BearerAuth) -> Json<Principal> {
//!     Json((*principal).clone())
//! }
//! ```

use std::sync::Arc;

use axum::extract::{FromRef, FromRequestParts};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use permitdesk_core::Principal;

use crate::error::AuthError;
use crate::resolver::PrincipalResolver;

/// State required by the auth extractors.
///
/// Include it in the application state and expose it through `FromRef`.
#[derive(Clone)]
pub struct AuthState {
    pub resolver: Arc<PrincipalResolver>,
}

impl AuthState {
    pub fn new(resolver: Arc<PrincipalResolver>) -> Self {
        Self { resolver }
    }
}

/// The principal behind a valid bearer credential.
///
/// Rejects with `InvalidCredential` when the header is missing or malformed,
/// and with whatever [`PrincipalResolver::resolve`] returns otherwise.
#[derive(Debug, Clone)]
pub struct BearerAuth(pub Arc<Principal>);

impl<S> FromRequestParts<S> for BearerAuth
where
    S: Send + Sync,
    AuthState: FromRef<S>,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let auth_state = AuthState::from_ref(state);

        let token = bearer_token(parts)
            .ok_or_else(|| AuthError::invalid_credential("Missing bearer credential"))?;

        let principal = auth_state.resolver.resolve(token).await?;
        tracing::debug!(subject = %principal.code, "Request authenticated");

        Ok(Self(principal))
    }
}

/// Token from `Authorization: Bearer <token>`; the scheme is case-insensitive.
fn bearer_token(parts: &Parts) -> Option<&str> {
    let header = parts.headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = header.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}
