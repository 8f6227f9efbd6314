//! [`Connector`], [`ConnectionPool`] and [`Session`] over sqlx.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use permitdesk_storage::{
    ConnectionPool, Connector, DbError, DbResult, ExecOutcome, PoolStatus, Row, Session,
    is_insert_sql,
};
use serde_json::{Value, json};
use sqlx_core::column::Column;
use sqlx_core::connection::Connection as _;
use sqlx_core::pool::PoolConnection;
use sqlx_core::query::Query;
use sqlx_core::row::Row as _;
use sqlx_postgres::{PgArguments, PgConnection, PgPool, PgRow, Postgres};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::{debug, instrument, warn};

use crate::config::PostgresConfig;
use crate::error::{PostgresError, map_sqlx_error};
use crate::placeholders::rewrite_placeholders;
use crate::pool::create_pool;

/// Builds pools and direct connections from a [`PostgresConfig`].
#[derive(Debug, Clone)]
pub struct PgConnector {
    config: PostgresConfig,
}

impl PgConnector {
    pub fn new(config: PostgresConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PostgresConfig {
        &self.config
    }
}

#[async_trait]
impl Connector for PgConnector {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn create_pool(&self) -> DbResult<Arc<dyn ConnectionPool>> {
        let pool = create_pool(&self.config).await?;
        Ok(Arc::new(PgConnectionPool {
            pool,
            max_size: self.config.pool_size,
        }))
    }

    #[instrument(skip(self), fields(url = %self.config.display_url()))]
    async fn connect_direct(&self) -> DbResult<Box<dyn Session>> {
        let options = self.config.connect_options()?;
        let timeout_ms = self.config.connect_timeout_ms;

        let conn = tokio::time::timeout(
            Duration::from_millis(timeout_ms),
            PgConnection::connect_with(&options),
        )
        .await
        .map_err(|_| PostgresError::Timeout { timeout_ms })?
        .map_err(PostgresError::from)?;

        debug!("Direct PostgreSQL connection opened");
        Ok(Box::new(PgSession::new(PgHandle::Direct(conn))))
    }
}

/// sqlx pool behind the [`ConnectionPool`] trait.
pub struct PgConnectionPool {
    pool: PgPool,
    max_size: u32,
}

#[async_trait]
impl ConnectionPool for PgConnectionPool {
    async fn acquire(&self) -> DbResult<Box<dyn Session>> {
        let conn = self.pool.acquire().await.map_err(map_sqlx_error)?;
        Ok(Box::new(PgSession::new(PgHandle::Pooled(conn))))
    }

    fn status(&self) -> PoolStatus {
        PoolStatus {
            size: self.pool.size(),
            idle: self.pool.num_idle() as u32,
            max_size: self.max_size,
        }
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

enum PgHandle {
    Pooled(PoolConnection<Postgres>),
    Direct(PgConnection),
}

impl PgHandle {
    fn conn(&mut self) -> &mut PgConnection {
        match self {
            Self::Pooled(conn) => &mut **conn,
            Self::Direct(conn) => conn,
        }
    }
}

/// One PostgreSQL session.
///
/// Transactions are driven with plain `BEGIN`/`COMMIT`/`ROLLBACK`. A pooled
/// session dropped mid-transaction is detached from the pool and closed
/// instead of being returned with the transaction still open.
pub struct PgSession {
    handle: Option<PgHandle>,
    in_transaction: bool,
}

impl PgSession {
    fn new(handle: PgHandle) -> Self {
        Self {
            handle: Some(handle),
            in_transaction: false,
        }
    }

    fn conn(&mut self) -> DbResult<&mut PgConnection> {
        self.handle
            .as_mut()
            .map(PgHandle::conn)
            .ok_or_else(|| DbError::connection_unavailable("session already released"))
    }

    async fn control(&mut self, sql: &'static str) -> DbResult<()> {
        let conn = self.conn()?;
        sqlx_core::query::query::<Postgres>(sql)
            .execute(conn)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }
}

#[async_trait]
impl Session for PgSession {
    async fn begin(&mut self) -> DbResult<()> {
        self.control("BEGIN").await?;
        self.in_transaction = true;
        Ok(())
    }

    async fn commit(&mut self) -> DbResult<()> {
        self.control("COMMIT").await?;
        self.in_transaction = false;
        Ok(())
    }

    async fn rollback(&mut self) -> DbResult<()> {
        self.control("ROLLBACK").await?;
        self.in_transaction = false;
        Ok(())
    }

    async fn fetch_optional(&mut self, sql: &str, params: &[Value]) -> DbResult<Option<Row>> {
        let sql = rewrite_placeholders(sql);
        let conn = self.conn()?;
        let row = bind_params(&sql, params)
            .fetch_optional(conn)
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.as_ref().map(decode_row))
    }

    async fn fetch_all(&mut self, sql: &str, params: &[Value]) -> DbResult<Vec<Row>> {
        let sql = rewrite_placeholders(sql);
        let conn = self.conn()?;
        let rows = bind_params(&sql, params)
            .fetch_all(conn)
            .await
            .map_err(map_sqlx_error)?;
        Ok(rows.iter().map(decode_row).collect())
    }

    async fn execute(&mut self, sql: &str, params: &[Value]) -> DbResult<ExecOutcome> {
        // Postgres has no last-insert-id; inserts report one through RETURNING.
        if is_insert_sql(sql) && has_returning(sql) {
            let rows = self.fetch_all(sql, params).await?;
            let last_insert_id = rows
                .first()
                .and_then(|row| {
                    row.get_i64("id")
                        .or_else(|| row.columns().next().and_then(|c| row.get_i64(c)))
                });
            return Ok(ExecOutcome {
                rows_affected: rows.len() as u64,
                last_insert_id,
            });
        }

        let sql = rewrite_placeholders(sql);
        let conn = self.conn()?;
        let result = bind_params(&sql, params)
            .execute(conn)
            .await
            .map_err(map_sqlx_error)?;
        Ok(ExecOutcome {
            rows_affected: result.rows_affected(),
            last_insert_id: None,
        })
    }
}

impl Drop for PgSession {
    fn drop(&mut self) {
        if self.in_transaction
            && let Some(PgHandle::Pooled(conn)) = self.handle.take()
        {
            warn!("Pooled session dropped inside a transaction, closing its connection");
            drop(conn.detach());
        }
    }
}

fn has_returning(sql: &str) -> bool {
    sql.split_whitespace()
        .any(|word| word.eq_ignore_ascii_case("returning"))
}

/// Binds JSON parameters in order.
fn bind_params<'q>(sql: &'q str, params: &'q [Value]) -> Query<'q, Postgres, PgArguments> {
    params
        .iter()
        .fold(sqlx_core::query::query::<Postgres>(sql), bind_json_value)
}

fn bind_json_value<'q>(
    query: Query<'q, Postgres, PgArguments>,
    value: &'q Value,
) -> Query<'q, Postgres, PgArguments> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(b) => query.bind(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                query.bind(i)
            } else if let Some(f) = n.as_f64() {
                query.bind(f)
            } else {
                query.bind(n.to_string())
            }
        }
        Value::String(s) => query.bind(s.as_str()),
        // Arrays and objects travel as JSONB.
        Value::Array(_) | Value::Object(_) => query.bind(value.clone()),
    }
}

/// Decodes every column into the closest JSON value.
fn decode_row(row: &PgRow) -> Row {
    row.columns()
        .iter()
        .enumerate()
        .map(|(idx, column)| (column.name().to_string(), decode_column(row, idx)))
        .collect()
}

fn decode_column(row: &PgRow, idx: usize) -> Value {
    if let Ok(val) = row.try_get::<Option<String>, _>(idx) {
        json!(val)
    } else if let Ok(val) = row.try_get::<Option<i64>, _>(idx) {
        json!(val)
    } else if let Ok(val) = row.try_get::<Option<i32>, _>(idx) {
        json!(val)
    } else if let Ok(val) = row.try_get::<Option<i16>, _>(idx) {
        json!(val)
    } else if let Ok(val) = row.try_get::<Option<f64>, _>(idx) {
        json!(val)
    } else if let Ok(val) = row.try_get::<Option<bool>, _>(idx) {
        json!(val)
    } else if let Ok(val) = row.try_get::<Option<OffsetDateTime>, _>(idx) {
        val.and_then(|ts| ts.format(&Rfc3339).ok())
            .map_or(Value::Null, Value::String)
    } else if let Ok(val) = row.try_get::<Option<Value>, _>(idx) {
        val.unwrap_or(Value::Null)
    } else {
        Value::Null
    }
}
