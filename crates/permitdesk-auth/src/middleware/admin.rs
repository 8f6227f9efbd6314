//! Admin-only extractor.

use std::sync::Arc;

use axum::extract::{FromRef, FromRequestParts};
use axum::http::request::Parts;
use permitdesk_core::Principal;

use super::auth::{AuthState, BearerAuth};
use crate::error::AuthError;

/// A resolved principal holding the admin role.
#[derive(Debug, Clone)]
pub struct AdminAuth(pub Arc<Principal>);

impl<S> FromRequestParts<S> for AdminAuth
where
    S: Send + Sync,
    AuthState: FromRef<S>,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let BearerAuth(principal) = BearerAuth::from_request_parts(parts, state).await?;

        if !principal.is_admin() {
            tracing::debug!(
                subject = %principal.code,
                role = %principal.role,
                "Admin access denied"
            );
            return Err(AuthError::forbidden("Admin access required"));
        }

        Ok(Self(principal))
    }
}
