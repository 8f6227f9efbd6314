//! Backend traits.
//!
//! A backend provides a [`Connector`], which can build a [`ConnectionPool`]
//! and open direct, unpooled [`Session`]s. Everything above this layer
//! (pool manager, executor, caches) is backend-agnostic.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::error::DbResult;
use crate::types::{ExecOutcome, Row};

/// One exclusive database session.
///
/// A session is owned by exactly one operation at a time. Dropping it returns
/// it to its pool (pooled sessions) or closes it (direct sessions). A session
/// dropped with a transaction still open must not return to the pool in that
/// state; backends discard such connections.
#[async_trait]
pub trait Session: Send {
    /// Starts an explicit transaction.
    async fn begin(&mut self) -> DbResult<()>;

    /// Commits the open transaction.
    async fn commit(&mut self) -> DbResult<()>;

    /// Rolls back the open transaction.
    async fn rollback(&mut self) -> DbResult<()>;

    /// Runs a read and returns its first row, if any.
    async fn fetch_optional(&mut self, sql: &str, params: &[Value]) -> DbResult<Option<Row>>;

    /// Runs a read and returns every row.
    async fn fetch_all(&mut self, sql: &str, params: &[Value]) -> DbResult<Vec<Row>>;

    /// Runs a write.
    async fn execute(&mut self, sql: &str, params: &[Value]) -> DbResult<ExecOutcome>;
}

/// Point-in-time pool occupancy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolStatus {
    /// Connections currently open (idle + in use).
    pub size: u32,
    pub idle: u32,
    /// Configured capacity.
    pub max_size: u32,
}

impl PoolStatus {
    pub fn active(&self) -> u32 {
        self.size.saturating_sub(self.idle)
    }
}

/// A bounded set of reusable sessions.
///
/// Implementations synchronize internally; `acquire` is called concurrently
/// without any outer lock.
#[async_trait]
pub trait ConnectionPool: Send + Sync {
    /// Checks out a session, waiting up to the backend's acquire timeout.
    async fn acquire(&self) -> DbResult<Box<dyn Session>>;

    fn status(&self) -> PoolStatus;

    /// Closes every connection. Subsequent acquires fail.
    async fn close(&self);
}

/// Entry point of a backend: creates pools and direct sessions.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Backend name for logs.
    fn backend(&self) -> &'static str;

    /// Builds a new pool. Called at most once per successful initialization.
    async fn create_pool(&self) -> DbResult<Arc<dyn ConnectionPool>>;

    /// Opens a standalone session outside any pool, bounded by the
    /// configured connect timeout.
    async fn connect_direct(&self) -> DbResult<Box<dyn Session>>;
}
