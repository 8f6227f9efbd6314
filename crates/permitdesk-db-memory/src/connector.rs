//! Connector, pool and session over a [`MemoryDatabase`].

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use permitdesk_storage::{
    ConnectionPool, Connector, DbError, DbResult, ExecOutcome, PoolStatus, Row, Session,
};
use serde_json::Value;
use tokio::sync::{OwnedMutexGuard, OwnedSemaphorePermit, Semaphore};
use tracing::debug;

use crate::database::{MemoryDatabase, MemoryOutput, Tables};

/// Pool sizing for the in-memory backend.
#[derive(Debug, Clone)]
pub struct MemoryOptions {
    pub max_size: u32,
    /// How long `acquire` waits for a free session before giving up.
    pub acquire_timeout: Duration,
}

impl Default for MemoryOptions {
    fn default() -> Self {
        Self {
            max_size: 10,
            acquire_timeout: Duration::from_secs(5),
        }
    }
}

/// [`Connector`] handing out sessions on one shared [`MemoryDatabase`].
#[derive(Clone)]
pub struct MemoryConnector {
    db: Arc<MemoryDatabase>,
    options: MemoryOptions,
}

impl MemoryConnector {
    pub fn new(db: Arc<MemoryDatabase>) -> Self {
        Self::with_options(db, MemoryOptions::default())
    }

    pub fn with_options(db: Arc<MemoryDatabase>, options: MemoryOptions) -> Self {
        Self { db, options }
    }

    pub fn database(&self) -> &Arc<MemoryDatabase> {
        &self.db
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn create_pool(&self) -> DbResult<Arc<dyn ConnectionPool>> {
        self.db.pool_creations.fetch_add(1, Ordering::SeqCst);

        let delay = self.db.pool_creation_delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.db.faults.fail_pool_creation.load(Ordering::SeqCst) {
            return Err(DbError::connection_unavailable("connection refused"));
        }

        debug!(max_size = self.options.max_size, "Memory pool created");
        Ok(Arc::new(MemoryPool {
            db: Arc::clone(&self.db),
            permits: Arc::new(Semaphore::new(self.options.max_size as usize)),
            max_size: self.options.max_size,
            acquire_timeout: self.options.acquire_timeout,
            opened: AtomicU32::new(0),
        }))
    }

    async fn connect_direct(&self) -> DbResult<Box<dyn Session>> {
        self.db.direct_connections.fetch_add(1, Ordering::SeqCst);
        if self.db.faults.fail_direct.load(Ordering::SeqCst) {
            return Err(DbError::connection_unavailable("connection refused"));
        }
        Ok(Box::new(MemorySession::new(Arc::clone(&self.db), false, None)))
    }
}

/// Bounded pool; capacity is enforced with a semaphore.
pub struct MemoryPool {
    db: Arc<MemoryDatabase>,
    permits: Arc<Semaphore>,
    max_size: u32,
    acquire_timeout: Duration,
    /// High-water mark of concurrently checked-out sessions.
    opened: AtomicU32,
}

impl MemoryPool {
    fn in_use(&self) -> u32 {
        self.max_size
            .saturating_sub(self.permits.available_permits() as u32)
    }
}

#[async_trait]
impl ConnectionPool for MemoryPool {
    async fn acquire(&self) -> DbResult<Box<dyn Session>> {
        if self.db.faults.fail_pool_acquire.load(Ordering::SeqCst) {
            return Err(DbError::connection_unavailable(
                "pool timed out while waiting for an open connection",
            ));
        }

        let permit = match tokio::time::timeout(
            self.acquire_timeout,
            Arc::clone(&self.permits).acquire_owned(),
        )
        .await
        {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => return Err(DbError::connection_unavailable("pool is closed")),
            Err(_) => {
                return Err(DbError::connection_unavailable(
                    "pool timed out while waiting for an open connection",
                ));
            }
        };

        self.opened.fetch_max(self.in_use(), Ordering::SeqCst);
        Ok(Box::new(MemorySession::new(
            Arc::clone(&self.db),
            true,
            Some(permit),
        )))
    }

    fn status(&self) -> PoolStatus {
        let in_use = self.in_use();
        let size = self.opened.load(Ordering::SeqCst).max(in_use);
        PoolStatus {
            size,
            idle: size - in_use,
            max_size: self.max_size,
        }
    }

    async fn close(&self) {
        self.permits.close();
    }
}

/// One session. A transaction works on a private copy of the tables and
/// holds the database write lock until it ends, so its commit cannot clobber
/// another writer.
pub struct MemorySession {
    db: Arc<MemoryDatabase>,
    pooled: bool,
    transaction: Option<Transaction>,
    _permit: Option<OwnedSemaphorePermit>,
}

struct Transaction {
    tables: Tables,
    _writer: OwnedMutexGuard<()>,
}

impl MemorySession {
    fn new(db: Arc<MemoryDatabase>, pooled: bool, permit: Option<OwnedSemaphorePermit>) -> Self {
        db.active_sessions.fetch_add(1, Ordering::SeqCst);
        Self {
            db,
            pooled,
            transaction: None,
            _permit: permit,
        }
    }

    async fn run(&mut self, sql: &str, params: &[Value]) -> DbResult<MemoryOutput> {
        if self.pooled && self.db.faults.break_pooled_sessions.load(Ordering::SeqCst) {
            return Err(DbError::connection_unavailable("connection reset by peer"));
        }
        match self.transaction.as_mut() {
            Some(tx) => self.db.run(&mut tx.tables, sql, params),
            None => {
                let _writer = self.db.lock_writer().await;
                self.db.run_autocommit(sql, params)
            }
        }
    }
}

#[async_trait]
impl Session for MemorySession {
    async fn begin(&mut self) -> DbResult<()> {
        if self.transaction.is_some() {
            return Err(DbError::statement_failed("transaction already in progress"));
        }
        let writer = self.db.lock_writer().await;
        self.transaction = Some(Transaction {
            tables: self.db.snapshot(),
            _writer: writer,
        });
        Ok(())
    }

    async fn commit(&mut self) -> DbResult<()> {
        let tx = self
            .transaction
            .take()
            .ok_or_else(|| DbError::statement_failed("no transaction in progress"))?;
        self.db.replace(tx.tables);
        Ok(())
    }

    async fn rollback(&mut self) -> DbResult<()> {
        self.transaction = None;
        Ok(())
    }

    async fn fetch_optional(&mut self, sql: &str, params: &[Value]) -> DbResult<Option<Row>> {
        Ok(match self.run(sql, params).await? {
            MemoryOutput::Rows(rows) => rows.into_iter().next(),
            MemoryOutput::Affected { .. } => None,
        })
    }

    async fn fetch_all(&mut self, sql: &str, params: &[Value]) -> DbResult<Vec<Row>> {
        Ok(match self.run(sql, params).await? {
            MemoryOutput::Rows(rows) => rows,
            MemoryOutput::Affected { .. } => Vec::new(),
        })
    }

    async fn execute(&mut self, sql: &str, params: &[Value]) -> DbResult<ExecOutcome> {
        Ok(match self.run(sql, params).await? {
            MemoryOutput::Rows(rows) => ExecOutcome {
                rows_affected: rows.len() as u64,
                last_insert_id: None,
            },
            MemoryOutput::Affected {
                rows_affected,
                last_insert_id,
            } => ExecOutcome {
                rows_affected,
                last_insert_id,
            },
        })
    }
}

impl Drop for MemorySession {
    fn drop(&mut self) {
        if self.transaction.is_some() {
            debug!("Session dropped with an open transaction, discarding it");
        }
        self.db.active_sessions.fetch_sub(1, Ordering::SeqCst);
    }
}
