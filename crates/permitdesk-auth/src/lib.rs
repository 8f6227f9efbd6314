//! # permitdesk-auth
//!
//! Bearer authentication for permitdesk.
//!
//! - [`jwt`] - HS256 token issuing and verification
//! - [`resolver`] - credential to [`Principal`](permitdesk_core::Principal)
//!   resolution through the principal cache
//! - [`middleware`] - axum extractors and error responses

pub mod error;
pub mod jwt;
pub mod middleware;
pub mod resolver;

pub use error::AuthError;
pub use jwt::{Claims, JwtError, JwtService};
pub use middleware::{AdminAuth, AuthState, BearerAuth};
pub use resolver::{DEFAULT_PRINCIPAL_TTL, PRINCIPAL_BY_CODE, PRINCIPAL_NAMESPACE, PrincipalResolver};
