//! sqlx pool construction.

use std::time::Duration;

use sqlx_core::pool::PoolOptions;
use sqlx_postgres::{PgPool, Postgres};
use tracing::{info, instrument};

use crate::config::PostgresConfig;
use crate::error::Result;

pub type PgPoolOptions = PoolOptions<Postgres>;

/// Lifetime of a pooled connection when `max_lifetime_secs` is unset.
const DEFAULT_MAX_LIFETIME: Duration = Duration::from_secs(30 * 60);

/// Pool sizing and timeouts derived from `config`.
///
/// At least one connection is opened eagerly so that an unreachable server
/// fails pool creation instead of the first checkout. Checkouts wait at most
/// `connect_timeout_ms`, after which the caller falls back to a direct
/// connection.
pub fn pool_options(config: &PostgresConfig) -> PgPoolOptions {
    let min_connections = config
        .min_connections
        .unwrap_or(1)
        .clamp(1, config.pool_size.max(1));
    let max_lifetime = config
        .max_lifetime_secs
        .map_or(DEFAULT_MAX_LIFETIME, Duration::from_secs);

    PgPoolOptions::new()
        .max_connections(config.pool_size)
        .min_connections(min_connections)
        .acquire_timeout(Duration::from_millis(config.connect_timeout_ms))
        .idle_timeout(config.idle_timeout_ms.map(Duration::from_millis))
        .max_lifetime(max_lifetime)
        .test_before_acquire(false)
}

/// Opens the pool described by `config`.
#[instrument(skip(config), fields(url = %config.display_url()))]
pub async fn create_pool(config: &PostgresConfig) -> Result<PgPool> {
    let options = pool_options(config);
    let pool = options.connect_with(config.connect_options()?).await?;
    info!(
        max = config.pool_size,
        open = pool.size(),
        "PostgreSQL pool ready"
    );
    Ok(pool)
}
