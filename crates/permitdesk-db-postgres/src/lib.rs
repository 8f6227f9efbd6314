//! PostgreSQL backend for permitdesk.
//!
//! [`PgConnector`] implements the `permitdesk-storage` backend traits on top
//! of sqlx. Statements use `?` placeholders, which are rewritten to `$n`
//! before they reach the server. Rows are decoded column by column into JSON
//! values.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use permitdesk_db_postgres::{PgConnector, PostgresConfig};
//! use permitdesk_storage::PoolManager;
//!
//! let connector = PgConnector::new(PostgresConfig::new("postgres://localhost/permitdesk"));
//! let manager = PoolManager::new(Arc::new(connector));
//! ```

pub mod config;
mod connector;
mod error;
mod placeholders;
pub mod pool;

pub use config::PostgresConfig;
pub use connector::{PgConnectionPool, PgConnector, PgSession};
pub use error::{PostgresError, Result, map_sqlx_error};
pub use placeholders::rewrite_placeholders;
pub use pool::{create_pool, pool_options};
