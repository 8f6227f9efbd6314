//! Prometheus metrics.
//!
//! - HTTP request count and latency per matched route
//! - connection pool occupancy and acquisition paths
//! - cache entries, hits and misses per namespace

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use permitdesk_core::CacheStats;
use permitdesk_storage::PoolManagerStatus;

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub mod names {
    // HTTP metrics
    pub const HTTP_REQUESTS_TOTAL: &str = "http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "http_request_duration_seconds";

    // Database pool metrics
    pub const DB_POOL_CONNECTIONS_TOTAL: &str = "db_pool_connections_total";
    pub const DB_POOL_CONNECTIONS_IDLE: &str = "db_pool_connections_idle";
    pub const DB_POOL_CONNECTIONS_ACTIVE: &str = "db_pool_connections_active";
    pub const DB_POOL_INITIALIZED: &str = "db_pool_initialized";
    pub const DB_ACQUIRES_TOTAL: &str = "db_acquires_total";

    // Cache metrics
    pub const CACHE_ENTRIES: &str = "cache_entries";
    pub const CACHE_HITS: &str = "cache_hits_total";
    pub const CACHE_MISSES: &str = "cache_misses_total";
    pub const CACHE_EVICTIONS: &str = "cache_evictions_total";
}

/// Installs the Prometheus recorder.
///
/// Returns `true` if this call installed it, `false` if it already was or
/// installation failed.
pub fn init_metrics() -> bool {
    if PROMETHEUS_HANDLE.get().is_some() {
        tracing::debug!("Prometheus metrics already initialized");
        return false;
    }

    // Pull-based: /metrics renders from the handle.
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            if PROMETHEUS_HANDLE.set(handle).is_err() {
                tracing::warn!("Failed to store Prometheus handle (already set)");
                return false;
            }
            tracing::info!("Prometheus metrics initialized");
            true
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to install Prometheus recorder");
            false
        }
    }
}

/// Renders every metric in Prometheus text format, or `None` before
/// [`init_metrics`].
pub fn render_metrics() -> Option<String> {
    PROMETHEUS_HANDLE.get().map(PrometheusHandle::render)
}

pub fn record_http_request(method: &str, route: &str, status: u16, duration: Duration) {
    let status_class = match status {
        200..=299 => "2xx",
        300..=399 => "3xx",
        400..=499 => "4xx",
        500..=599 => "5xx",
        _ => "other",
    };

    counter!(
        names::HTTP_REQUESTS_TOTAL,
        "method" => method.to_string(),
        "path" => route.to_string(),
        "status_class" => status_class
    )
    .increment(1);

    histogram!(
        names::HTTP_REQUEST_DURATION_SECONDS,
        "method" => method.to_string(),
        "path" => route.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Publishes pool occupancy and acquisition counters.
pub fn record_pool_status(status: &PoolManagerStatus) {
    let pool = status.pool.unwrap_or_default();
    gauge!(names::DB_POOL_CONNECTIONS_TOTAL).set(f64::from(pool.size));
    gauge!(names::DB_POOL_CONNECTIONS_IDLE).set(f64::from(pool.idle));
    gauge!(names::DB_POOL_CONNECTIONS_ACTIVE).set(f64::from(pool.active()));
    gauge!(names::DB_POOL_INITIALIZED).set(if status.initialized { 1.0 } else { 0.0 });

    for (path, value) in [
        ("pooled", status.pooled_acquires),
        ("direct", status.direct_acquires),
        ("failed", status.failed_acquires),
    ] {
        counter!(names::DB_ACQUIRES_TOTAL, "path" => path).absolute(value);
    }
}

/// Publishes one cache namespace's statistics.
pub fn record_cache_stats(namespace: &'static str, stats: &CacheStats) {
    gauge!(names::CACHE_ENTRIES, "namespace" => namespace).set(stats.size as f64);
    counter!(names::CACHE_HITS, "namespace" => namespace).absolute(stats.hits);
    counter!(names::CACHE_MISSES, "namespace" => namespace).absolute(stats.misses);
    counter!(names::CACHE_EVICTIONS, "namespace" => namespace).absolute(stats.evictions);
}
