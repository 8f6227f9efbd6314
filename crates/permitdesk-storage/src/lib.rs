//! # permitdesk-storage
//!
//! Backend-agnostic data access for permitdesk.
//!
//! This crate defines the traits a database backend implements ([`Connector`],
//! [`ConnectionPool`], [`Session`]) and the layers built on top of them:
//!
//! - [`PoolManager`] - lazily created pool with direct-connection fallback
//! - [`QueryExecutor`] - single statements and batches, shaped by [`QueryMode`]
//! - [`CachedQueries`] - named read results served through a TTL cache
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use permitdesk_storage::{PoolManager, QueryExecutor, Statement};
//!
//! async fn find_user(connector: Arc<dyn Connector>) -> DbResult<Option<Row>> {
//!     let executor = QueryExecutor::new(Arc::new(PoolManager::new(connector)));
//!     executor
//!         .fetch_one("SELECT * FROM users WHERE code = ?", vec!["u42".into()])
//!         .await
//! }
//! ```

pub mod cached;
mod error;
pub mod executor;
pub mod pool;
mod traits;
mod types;

pub use cached::{CachedQueries, DEFAULT_QUERY_TTL};
pub use error::{DbError, DbResult, ErrorCategory};
pub use executor::QueryExecutor;
pub use pool::{
    Acquired, Connection, ConnectionOrigin, DEFAULT_POOL_RETRY, PoolManager, PoolManagerStatus,
};
pub use traits::{ConnectionPool, Connector, PoolStatus, Session};
pub use types::{ExecOutcome, Params, QueryMode, QueryResult, Row, Statement, is_insert_sql};
