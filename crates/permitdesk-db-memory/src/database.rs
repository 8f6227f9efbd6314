//! Shared in-memory database state.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use permitdesk_storage::{DbError, DbResult, Row};
use serde_json::Value;
use tokio::sync::OwnedMutexGuard;

/// Table name to rows, in insertion order.
pub type Tables = BTreeMap<String, Vec<Row>>;

/// What a statement handler produced.
#[derive(Debug, Clone, PartialEq)]
pub enum MemoryOutput {
    Rows(Vec<Row>),
    Affected {
        rows_affected: u64,
        last_insert_id: Option<i64>,
    },
}

impl MemoryOutput {
    pub fn rows(rows: impl IntoIterator<Item = Row>) -> Self {
        Self::Rows(rows.into_iter().collect())
    }

    pub fn affected(rows_affected: u64) -> Self {
        Self::Affected {
            rows_affected,
            last_insert_id: None,
        }
    }

    /// One inserted row with a generated id.
    pub fn inserted(id: i64) -> Self {
        Self::Affected {
            rows_affected: 1,
            last_insert_id: Some(id),
        }
    }
}

pub(crate) type Handler = Arc<dyn Fn(&mut Tables, &[Value]) -> DbResult<MemoryOutput> + Send + Sync>;

/// Switches that make the backend misbehave on purpose.
#[derive(Debug, Default)]
pub struct Faults {
    pub fail_pool_creation: AtomicBool,
    /// Pool exists but every checkout times out.
    pub fail_pool_acquire: AtomicBool,
    pub fail_direct: AtomicBool,
    /// Statements on pooled sessions fail as if the connection dropped.
    pub break_pooled_sessions: AtomicBool,
}

/// Scriptable database shared by every connection of a [`MemoryConnector`].
///
/// Statements are matched by their exact SQL text against handlers registered
/// with [`on`](Self::on). A handler receives the tables and the bound
/// parameters, so tests decide what each statement means.
///
/// Writers are serialized: an open transaction holds the write lock until it
/// commits, rolls back or is dropped, and statements outside a transaction
/// wait for it. Reads of committed state through [`table`](Self::table) never
/// wait.
///
/// [`MemoryConnector`]: crate::MemoryConnector
#[derive(Default)]
pub struct MemoryDatabase {
    tables: RwLock<Tables>,
    writer: Arc<tokio::sync::Mutex<()>>,
    handlers: RwLock<HashMap<String, Handler>>,
    pub faults: Faults,
    pool_creation_delay: Mutex<Duration>,
    pub(crate) pool_creations: AtomicU64,
    pub(crate) direct_connections: AtomicU64,
    pub(crate) active_sessions: AtomicUsize,
    executed: Mutex<HashMap<String, u64>>,
}

impl MemoryDatabase {
    /// Creates an empty database that only understands `SELECT 1`.
    pub fn new() -> Arc<Self> {
        let db = Self::default();
        db.on("SELECT 1", |_, _| {
            Ok(MemoryOutput::rows([Row::new().with("?column?", 1)]))
        });
        Arc::new(db)
    }

    /// Registers the handler for `sql`, replacing any previous one.
    pub fn on<F>(&self, sql: impl Into<String>, handler: F)
    where
        F: Fn(&mut Tables, &[Value]) -> DbResult<MemoryOutput> + Send + Sync + 'static,
    {
        self.handlers.write().insert(sql.into(), Arc::new(handler));
    }

    /// Appends rows to a table, creating it if needed.
    pub fn seed(&self, table: &str, rows: impl IntoIterator<Item = Row>) {
        self.tables
            .write()
            .entry(table.to_string())
            .or_default()
            .extend(rows);
    }

    /// Committed rows of `table`.
    pub fn table(&self, table: &str) -> Vec<Row> {
        self.tables.read().get(table).cloned().unwrap_or_default()
    }

    pub fn set_pool_creation_delay(&self, delay: Duration) {
        *self.pool_creation_delay.lock() = delay;
    }

    pub fn pool_creation_delay(&self) -> Duration {
        *self.pool_creation_delay.lock()
    }

    pub fn pool_creations(&self) -> u64 {
        self.pool_creations.load(Ordering::SeqCst)
    }

    pub fn direct_connections(&self) -> u64 {
        self.direct_connections.load(Ordering::SeqCst)
    }

    /// Sessions currently checked out or open.
    pub fn active_sessions(&self) -> usize {
        self.active_sessions.load(Ordering::SeqCst)
    }

    /// How many times `sql` was executed, successfully or not.
    pub fn executions(&self, sql: &str) -> u64 {
        self.executed.lock().get(sql).copied().unwrap_or(0)
    }

    pub fn total_executions(&self) -> u64 {
        self.executed.lock().values().sum()
    }

    /// Waits for exclusive write access.
    pub(crate) async fn lock_writer(&self) -> OwnedMutexGuard<()> {
        Arc::clone(&self.writer).lock_owned().await
    }

    pub(crate) fn snapshot(&self) -> Tables {
        self.tables.read().clone()
    }

    pub(crate) fn replace(&self, tables: Tables) {
        *self.tables.write() = tables;
    }

    /// Runs `sql` against `tables`. The handler works on a copy, so a failing
    /// statement leaves `tables` untouched.
    pub(crate) fn run(&self, tables: &mut Tables, sql: &str, params: &[Value]) -> DbResult<MemoryOutput> {
        *self.executed.lock().entry(sql.to_string()).or_default() += 1;

        let handler = self
            .handlers
            .read()
            .get(sql)
            .cloned()
            .ok_or_else(|| DbError::statement_failed(format!("unknown statement: {sql}")))?;

        let mut scratch = tables.clone();
        let output = handler(&mut scratch, params)?;
        *tables = scratch;
        Ok(output)
    }

    /// Runs `sql` outside any transaction and commits its effect in place.
    ///
    /// Callers on a session hold the write lock so that no transaction
    /// commit can overwrite the change.
    pub(crate) fn run_autocommit(&self, sql: &str, params: &[Value]) -> DbResult<MemoryOutput> {
        let mut tables = self.tables.write();
        self.run(&mut tables, sql, params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unknown_statement_is_rejected() {
        let db = MemoryDatabase::new();
        let err = db.run_autocommit("SELECT 2", &[]).unwrap_err();
        assert!(matches!(err, DbError::StatementFailed { .. }));
        assert_eq!(db.executions("SELECT 2"), 1);
    }

    #[test]
    fn test_failing_handler_leaves_tables_untouched() {
        let db = MemoryDatabase::new();
        db.on("INSERT", |tables, params| {
            tables
                .entry("t".into())
                .or_default()
                .push(Row::new().with("v", params[0].clone()));
            if params[0] == json!("bad") {
                return Err(DbError::statement_failed_with_code("check violation", "23514"));
            }
            Ok(MemoryOutput::inserted(1))
        });

        db.run_autocommit("INSERT", &[json!("ok")]).unwrap();
        db.run_autocommit("INSERT", &[json!("bad")]).unwrap_err();

        assert_eq!(db.table("t"), vec![Row::new().with("v", "ok")]);
    }
}
