//! Bearer credential to [`Principal`] resolution.
//!
//! ```text
//! token ─verify─► subject ─cache hit──────────────────────► Principal
//!                        └─cache miss─► users lookup ─put─► Principal
//! ```
//!
//! A cached principal is served for up to the cache TTL. Components that
//! change a user's stored record call [`PrincipalResolver::invalidate`] so the
//! next request reads it fresh.

use std::sync::Arc;
use std::time::{Duration, Instant};

use permitdesk_core::{CacheStats, PerformanceMetrics, Principal, TtlCache, cache_key};
use permitdesk_storage::{DbError, QueryExecutor, Statement};
use serde_json::json;
use tracing::{debug, instrument, warn};

use crate::error::AuthError;
use crate::jwt::JwtService;

/// Cache key namespace for principals.
pub const PRINCIPAL_NAMESPACE: &str = "principal";

/// Default time a resolved principal stays cached.
pub const DEFAULT_PRINCIPAL_TTL: Duration = Duration::from_secs(300);

/// Single-row lookup of a principal by user code. Never selects the password.
pub const PRINCIPAL_BY_CODE: &str =
    "SELECT code, name, role, phone, position, email FROM users WHERE code = ?";

/// Resolves bearer credentials to principals through a TTL cache.
pub struct PrincipalResolver {
    jwt: Arc<JwtService>,
    executor: QueryExecutor,
    cache: Arc<TtlCache<Principal>>,
    metrics: Arc<PerformanceMetrics>,
}

impl PrincipalResolver {
    pub fn new(
        jwt: Arc<JwtService>,
        executor: QueryExecutor,
        cache: Arc<TtlCache<Principal>>,
        metrics: Arc<PerformanceMetrics>,
    ) -> Self {
        Self {
            jwt,
            executor,
            cache,
            metrics,
        }
    }

    pub fn jwt(&self) -> &JwtService {
        &self.jwt
    }

    /// Resolves `token` to its principal.
    ///
    /// Counts as one request in the performance metrics, successful or not.
    ///
    /// # Errors
    ///
    /// - `InvalidCredential` if the token fails verification or has no subject
    /// - `PrincipalNotFound` if no user has the token's subject
    /// - `Storage` if the lookup failed on both the pooled and direct paths
    pub async fn resolve(&self, token: &str) -> Result<Arc<Principal>, AuthError> {
        let started = Instant::now();
        let result = self.resolve_uncounted(token).await;
        self.metrics.record_request(started.elapsed(), result.is_ok());
        result
    }

    async fn resolve_uncounted(&self, token: &str) -> Result<Arc<Principal>, AuthError> {
        let subject = self.jwt.subject(token).map_err(|e| {
            debug!(error = %e, "Credential rejected");
            AuthError::from(e)
        })?;

        let key = cache_key(PRINCIPAL_NAMESPACE, &subject);
        if let Some(principal) = self.cache.get(&key) {
            self.metrics.record_cache_hit();
            debug!(subject = %subject, "Principal served from cache");
            return Ok(principal);
        }
        self.metrics.record_cache_miss();

        let principal = self
            .lookup(&subject)
            .await?
            .ok_or_else(|| AuthError::principal_not_found(&subject))?;

        Ok(self.cache.put(key, principal))
    }

    /// Reads the principal from the database, bypassing the cache.
    ///
    /// An infrastructure failure on the pooled path is retried once on a
    /// direct connection.
    #[instrument(skip(self))]
    pub async fn lookup(&self, subject: &str) -> Result<Option<Principal>, AuthError> {
        let statement = Statement::fetch_one(PRINCIPAL_BY_CODE, vec![json!(subject)]);
        let row = self
            .executor
            .execute_or_direct(&statement)
            .await
            .inspect_err(|e| warn!(error = %e, "Principal lookup failed"))?
            .into_row();

        row.map(|row| row.decode::<Principal>())
            .transpose()
            .map_err(|e| {
                AuthError::Storage(DbError::statement_failed(format!(
                    "malformed user record: {e}"
                )))
            })
    }

    /// Drops the cached principal for `subject`.
    ///
    /// Call after any change to the user's stored record.
    pub fn invalidate(&self, subject: &str) -> bool {
        self.cache.invalidate(&cache_key(PRINCIPAL_NAMESPACE, subject))
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }
}
