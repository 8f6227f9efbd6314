//! Connection pool manager.
//!
//! [`PoolManager`] owns the process's connection pool. The pool is created
//! lazily on the first acquisition with double-checked locking: a lock-free
//! load of the pool pointer on the hot path, and a mutex plus re-check only
//! while the pool does not exist yet. Concurrent first callers therefore
//! construct exactly one pool.
//!
//! ## Fallback
//!
//! Acquisition is a two-tier strategy returning [`Acquired`]:
//!
//! ```text
//! pooled session ──fail──► direct session ──fail──► Failed(PoolUnavailable)
//! ```
//!
//! A failed pool creation is logged, not raised. Creation is retried only
//! after `retry_after` has elapsed; until then acquisitions go straight to
//! direct connections.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use arc_swap::ArcSwapOption;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};

use crate::error::{DbError, DbResult};
use crate::traits::{ConnectionPool, Connector, PoolStatus, Session};

/// Default delay before a failed pool creation is attempted again.
pub const DEFAULT_POOL_RETRY: Duration = Duration::from_secs(30);

/// Where a connection came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionOrigin {
    Pooled,
    Direct,
}

impl fmt::Display for ConnectionOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pooled => write!(f, "pooled"),
            Self::Direct => write!(f, "direct"),
        }
    }
}

/// Scoped handle to an exclusive session.
///
/// Dropping the handle releases the session on every exit path, including
/// task cancellation: pooled sessions go back to their pool and direct
/// sessions are closed.
pub struct Connection {
    session: Box<dyn Session>,
    origin: ConnectionOrigin,
    acquired_at: Instant,
}

impl Connection {
    fn new(session: Box<dyn Session>, origin: ConnectionOrigin) -> Self {
        Self {
            session,
            origin,
            acquired_at: Instant::now(),
        }
    }

    pub fn origin(&self) -> ConnectionOrigin {
        self.origin
    }
}

impl Deref for Connection {
    type Target = dyn Session;

    fn deref(&self) -> &Self::Target {
        self.session.as_ref()
    }
}

impl DerefMut for Connection {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.session.as_mut()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        tracing::trace!(
            origin = %self.origin,
            held_ms = self.acquired_at.elapsed().as_millis() as u64,
            "Connection released"
        );
    }
}

/// Outcome of [`PoolManager::acquire`].
pub enum Acquired {
    /// Session checked out of the pool.
    Pooled(Connection),
    /// Pool unavailable or exhausted; a direct session was opened instead.
    Direct(Connection),
    /// Neither path produced a session.
    Failed(DbError),
}

impl Acquired {
    /// Collapses the outcome into a connection or the failure.
    pub fn into_result(self) -> DbResult<Connection> {
        match self {
            Self::Pooled(conn) | Self::Direct(conn) => Ok(conn),
            Self::Failed(err) => Err(err),
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Direct(_))
    }
}

/// Counters and pool occupancy for health endpoints.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PoolManagerStatus {
    pub backend: &'static str,
    pub initialized: bool,
    pub closed: bool,
    pub creation_attempts: u32,
    pub pooled_acquires: u64,
    pub direct_acquires: u64,
    /// Acquisitions where no path produced a session.
    pub failed_acquires: u64,
    pub pool: Option<PoolStatus>,
}

struct PoolSlot {
    pool: Arc<dyn ConnectionPool>,
}

#[derive(Default)]
struct InitState {
    last_failure: Option<Instant>,
}

/// Lazily-initialized connection pool with direct-connection fallback.
pub struct PoolManager {
    connector: Arc<dyn Connector>,
    pool: ArcSwapOption<PoolSlot>,
    init: Mutex<InitState>,
    retry_after: Duration,
    closed: AtomicBool,
    creation_attempts: AtomicU32,
    pooled_acquires: AtomicU64,
    direct_acquires: AtomicU64,
    failed_acquires: AtomicU64,
}

impl PoolManager {
    /// Creates a manager. No connection is opened until the first acquire.
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            pool: ArcSwapOption::empty(),
            init: Mutex::new(InitState::default()),
            retry_after: DEFAULT_POOL_RETRY,
            closed: AtomicBool::new(false),
            creation_attempts: AtomicU32::new(0),
            pooled_acquires: AtomicU64::new(0),
            direct_acquires: AtomicU64::new(0),
            failed_acquires: AtomicU64::new(0),
        }
    }

    /// Sets the delay before a failed pool creation is retried.
    #[must_use]
    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = retry_after;
        self
    }

    pub fn backend(&self) -> &'static str {
        self.connector.backend()
    }

    pub fn is_initialized(&self) -> bool {
        self.pool.load().is_some()
    }

    /// Returns the pool, creating it on first use.
    ///
    /// Returns `None` when creation failed (now or within the retry window)
    /// or the manager is closed.
    pub async fn pool(&self) -> Option<Arc<dyn ConnectionPool>> {
        if let Some(slot) = self.pool.load_full() {
            return Some(Arc::clone(&slot.pool));
        }

        let mut state = self.init.lock().await;

        // Another task may have finished initialization while we waited.
        if let Some(slot) = self.pool.load_full() {
            return Some(Arc::clone(&slot.pool));
        }
        if self.closed.load(Ordering::Acquire) {
            return None;
        }
        if let Some(failed_at) = state.last_failure
            && failed_at.elapsed() < self.retry_after
        {
            return None;
        }

        let attempt = self.creation_attempts.fetch_add(1, Ordering::Relaxed) + 1;
        match self.connector.create_pool().await {
            Ok(pool) => {
                info!(
                    backend = self.connector.backend(),
                    attempt,
                    "Connection pool created"
                );
                self.pool.store(Some(Arc::new(PoolSlot {
                    pool: Arc::clone(&pool),
                })));
                state.last_failure = None;
                Some(pool)
            }
            Err(e) => {
                error!(
                    backend = self.connector.backend(),
                    attempt,
                    error = %e,
                    retry_after_secs = self.retry_after.as_secs(),
                    "Failed to create connection pool, using direct connections"
                );
                state.last_failure = Some(Instant::now());
                None
            }
        }
    }

    /// Acquires a session: pooled first, direct as fallback.
    #[instrument(skip(self), fields(backend = self.connector.backend()))]
    pub async fn acquire(&self) -> Acquired {
        if self.closed.load(Ordering::Acquire) {
            self.failed_acquires.fetch_add(1, Ordering::Relaxed);
            return Acquired::Failed(DbError::pool_unavailable("pool manager is closed"));
        }

        let pooled_error = match self.pool().await {
            Some(pool) => match pool.acquire().await {
                Ok(session) => {
                    self.pooled_acquires.fetch_add(1, Ordering::Relaxed);
                    return Acquired::Pooled(Connection::new(session, ConnectionOrigin::Pooled));
                }
                Err(e) => {
                    warn!(error = %e, "Pooled acquisition failed, falling back to a direct connection");
                    e.to_string()
                }
            },
            None => "connection pool not available".to_string(),
        };

        match self.connector.connect_direct().await {
            Ok(session) => {
                self.direct_acquires.fetch_add(1, Ordering::Relaxed);
                debug!("Direct connection opened");
                Acquired::Direct(Connection::new(session, ConnectionOrigin::Direct))
            }
            Err(e) => {
                self.failed_acquires.fetch_add(1, Ordering::Relaxed);
                error!(
                    pooled_error = %pooled_error,
                    direct_error = %e,
                    "No database connection available"
                );
                Acquired::Failed(DbError::pool_unavailable(format!(
                    "{pooled_error}; direct connection failed: {e}"
                )))
            }
        }
    }

    /// Opens a direct session, bypassing the pool entirely.
    ///
    /// # Errors
    ///
    /// Returns `ConnectionUnavailable` if the connection cannot be opened.
    pub async fn acquire_direct(&self) -> DbResult<Connection> {
        if self.closed.load(Ordering::Acquire) {
            self.failed_acquires.fetch_add(1, Ordering::Relaxed);
            return Err(DbError::connection_unavailable("pool manager is closed"));
        }

        match self.connector.connect_direct().await {
            Ok(session) => {
                self.direct_acquires.fetch_add(1, Ordering::Relaxed);
                Ok(Connection::new(session, ConnectionOrigin::Direct))
            }
            Err(e) => {
                self.failed_acquires.fetch_add(1, Ordering::Relaxed);
                error!(error = %e, "Direct connection failed");
                Err(match e {
                    DbError::ConnectionUnavailable { .. } => e,
                    other => DbError::connection_unavailable(other.to_string()),
                })
            }
        }
    }

    /// Runs `SELECT 1` on a fresh acquisition and reports whether it worked.
    ///
    /// Failures are logged, never raised, so startup can continue degraded.
    pub async fn test_connection(&self) -> bool {
        let result = async {
            let mut conn = self.acquire().await.into_result()?;
            conn.fetch_optional("SELECT 1", &[]).await?;
            Ok::<_, DbError>(conn.origin())
        }
        .await;

        match result {
            Ok(origin) => {
                info!(origin = %origin, "Database connection established");
                true
            }
            Err(e) => {
                error!(error = %e, "Database connection test failed");
                false
            }
        }
    }

    /// Closes the pool. Later acquisitions fail with `PoolUnavailable`.
    pub async fn close(&self) {
        self.closed.store(true, Ordering::Release);
        let _guard = self.init.lock().await;
        if let Some(slot) = self.pool.swap(None) {
            slot.pool.close().await;
            info!(backend = self.connector.backend(), "Connection pool closed");
        }
    }

    pub fn status(&self) -> PoolManagerStatus {
        let pool = self.pool.load_full().map(|slot| slot.pool.status());
        PoolManagerStatus {
            backend: self.connector.backend(),
            initialized: pool.is_some(),
            closed: self.closed.load(Ordering::Acquire),
            creation_attempts: self.creation_attempts.load(Ordering::Relaxed),
            pooled_acquires: self.pooled_acquires.load(Ordering::Relaxed),
            direct_acquires: self.direct_acquires.load(Ordering::Relaxed),
            failed_acquires: self.failed_acquires.load(Ordering::Relaxed),
            pool,
        }
    }
}
