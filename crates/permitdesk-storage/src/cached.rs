//! Named query results served through a TTL cache.

use std::sync::Arc;
use std::time::{Duration, Instant};

use permitdesk_core::{CacheStats, PerformanceMetrics, TtlCache};
use tracing::debug;

use crate::error::DbResult;
use crate::executor::QueryExecutor;
use crate::types::{QueryResult, Statement};

/// Default freshness window for list-style query results.
pub const DEFAULT_QUERY_TTL: Duration = Duration::from_secs(60);

/// Caches read results under caller-chosen names such as `users:list` or
/// `users:role:admin`.
///
/// Names double as invalidation targets: [`invalidate_matching("users:")`]
/// drops every user listing at once.
///
/// [`invalidate_matching("users:")`]: CachedQueries::invalidate_matching
#[derive(Clone)]
pub struct CachedQueries {
    executor: QueryExecutor,
    cache: Arc<TtlCache<QueryResult>>,
    metrics: Arc<PerformanceMetrics>,
}

impl CachedQueries {
    pub fn new(
        executor: QueryExecutor,
        cache: Arc<TtlCache<QueryResult>>,
        metrics: Arc<PerformanceMetrics>,
    ) -> Self {
        Self {
            executor,
            cache,
            metrics,
        }
    }

    /// Returns the cached result for `name`, or runs `statement` and caches
    /// its result with the cache's default TTL.
    ///
    /// Only successful reads are cached. The fetch counts as one request in
    /// the performance metrics.
    pub async fn fetch(&self, name: &str, statement: &Statement) -> DbResult<Arc<QueryResult>> {
        let started = Instant::now();

        if let Some(hit) = self.cache.get(name) {
            self.metrics.record_cache_hit();
            self.metrics.record_request(started.elapsed(), true);
            return Ok(hit);
        }
        self.metrics.record_cache_miss();

        let result = self.executor.execute_or_direct(statement).await;
        self.metrics.record_request(started.elapsed(), result.is_ok());

        let result = result?;
        if statement.mode.is_read() {
            debug!(name, "Caching query result");
            Ok(self.cache.put(name, result))
        } else {
            Ok(Arc::new(result))
        }
    }

    pub fn invalidate(&self, name: &str) -> bool {
        self.cache.invalidate(name)
    }

    /// Drops every cached result whose name contains `pattern`.
    pub fn invalidate_matching(&self, pattern: &str) -> usize {
        self.cache.invalidate_matching(pattern)
    }

    pub fn clear(&self) {
        self.cache.clear();
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn executor(&self) -> &QueryExecutor {
        &self.executor
    }
}
