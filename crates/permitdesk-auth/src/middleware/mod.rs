//! Axum integration: bearer extractors and error responses.
//!
//! - [`BearerAuth`] resolves the `Authorization: Bearer` credential to a
//!   [`Principal`](permitdesk_core::Principal).
//! - [`AdminAuth`] additionally requires the admin role.
//! - [`AuthError`](crate::AuthError) implements `IntoResponse`.

mod admin;
mod auth;
mod error;

pub use admin::AdminAuth;
pub use auth::{AuthState, BearerAuth};
