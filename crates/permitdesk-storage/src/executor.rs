//! Statement execution on top of [`PoolManager`].

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::error::{DbError, DbResult};
use crate::pool::PoolManager;
use crate::traits::Session;
use crate::types::{QueryMode, QueryResult, Row, Statement};

/// Runs statements on connections obtained from a [`PoolManager`].
///
/// Every call acquires its own connection and releases it before returning,
/// whether the statement succeeded, failed, or the future was dropped.
#[derive(Clone)]
pub struct QueryExecutor {
    pool: Arc<PoolManager>,
}

impl QueryExecutor {
    pub fn new(pool: Arc<PoolManager>) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &Arc<PoolManager> {
        &self.pool
    }

    /// Executes one statement on a pooled connection, or a direct one if the
    /// pool is unavailable.
    ///
    /// # Errors
    ///
    /// `PoolUnavailable` when no connection could be obtained, otherwise the
    /// statement's own failure (after rollback for mutating statements).
    #[instrument(skip_all, fields(mode = ?statement.mode))]
    pub async fn execute(&self, statement: &Statement) -> DbResult<QueryResult> {
        let mut conn = self.pool.acquire().await.into_result()?;
        run_statement(&mut *conn, statement).await
    }

    /// Executes one statement on a direct connection, bypassing the pool.
    #[instrument(skip_all, fields(mode = ?statement.mode))]
    pub async fn execute_direct(&self, statement: &Statement) -> DbResult<QueryResult> {
        let mut conn = self.pool.acquire_direct().await?;
        run_statement(&mut *conn, statement).await
    }

    /// Like [`execute`](Self::execute), but read statements that fail with an
    /// infrastructure error are retried once on a direct connection.
    ///
    /// Mutating statements are never retried.
    pub async fn execute_or_direct(&self, statement: &Statement) -> DbResult<QueryResult> {
        match self.execute(statement).await {
            Err(e) if e.is_infrastructure() && statement.mode.is_read() => {
                warn!(error = %e, "Read failed on primary path, retrying on a direct connection");
                self.execute_direct(statement).await
            }
            result => result,
        }
    }

    /// Single-row read. A missing row is `Ok(None)`.
    pub async fn fetch_one(&self, sql: &str, params: Vec<Value>) -> DbResult<Option<Row>> {
        self.execute(&Statement::fetch_one(sql, params))
            .await
            .map(QueryResult::into_row)
    }

    pub async fn fetch_all(&self, sql: &str, params: Vec<Value>) -> DbResult<Vec<Row>> {
        self.execute(&Statement::fetch_all(sql, params))
            .await
            .map(QueryResult::into_rows)
    }

    /// Transactional write.
    pub async fn mutate(&self, sql: &str, params: Vec<Value>) -> DbResult<QueryResult> {
        self.execute(&Statement::mutate(sql, params)).await
    }

    /// Executes `statements` in order on one connection.
    ///
    /// With `atomic`, all statements share one transaction: the first failure
    /// rolls everything back, skips the rest and returns
    /// `TransactionAborted` with the failing index. Without it, each mutating
    /// statement commits on its own and the first failure stops the batch.
    ///
    /// Results are returned in input order.
    #[instrument(skip_all, fields(len = statements.len(), atomic = atomic))]
    pub async fn execute_batch(
        &self,
        statements: &[Statement],
        atomic: bool,
    ) -> DbResult<Vec<QueryResult>> {
        if statements.is_empty() {
            return Ok(Vec::new());
        }

        let mut conn = self.pool.acquire().await.into_result()?;

        if !atomic {
            let mut results = Vec::with_capacity(statements.len());
            for statement in statements {
                results.push(run_statement(&mut *conn, statement).await?);
            }
            return Ok(results);
        }

        conn.begin().await?;

        let mut results = Vec::with_capacity(statements.len());
        for (index, statement) in statements.iter().enumerate() {
            match run_in_session(&mut *conn, statement).await {
                Ok(result) => results.push(result),
                Err(e) => {
                    warn!(index, error = %e, "Batch statement failed, rolling back");
                    rollback_quietly(&mut *conn).await;
                    return Err(DbError::transaction_aborted(index, e));
                }
            }
        }

        conn.commit().await?;
        debug!(statements = results.len(), "Batch committed");
        Ok(results)
    }
}

/// Runs one statement; mutating statements get their own transaction.
async fn run_statement(session: &mut dyn Session, statement: &Statement) -> DbResult<QueryResult> {
    match statement.mode {
        QueryMode::SingleRow | QueryMode::AllRows => run_in_session(session, statement).await,
        QueryMode::Mutating => {
            session.begin().await?;
            match session.execute(&statement.sql, &statement.params).await {
                Ok(outcome) => {
                    session.commit().await?;
                    Ok(QueryResult::from_outcome(statement, outcome))
                }
                Err(e) => {
                    rollback_quietly(session).await;
                    Err(e)
                }
            }
        }
    }
}

/// Runs one statement without transaction control of its own.
async fn run_in_session(
    session: &mut dyn Session,
    statement: &Statement,
) -> DbResult<QueryResult> {
    let Statement { sql, params, mode } = statement;
    match mode {
        QueryMode::SingleRow => Ok(QueryResult::Row(session.fetch_optional(sql, params).await?)),
        QueryMode::AllRows => Ok(QueryResult::Rows(session.fetch_all(sql, params).await?)),
        QueryMode::Mutating => {
            let outcome = session.execute(sql, params).await?;
            Ok(QueryResult::from_outcome(statement, outcome))
        }
    }
}

/// Rolls back, logging instead of returning a rollback failure so the
/// original error is the one propagated.
async fn rollback_quietly(session: &mut dyn Session) {
    if let Err(e) = session.rollback().await {
        warn!(error = %e, "Rollback failed");
    }
}
