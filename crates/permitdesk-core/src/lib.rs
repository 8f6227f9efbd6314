//! # permitdesk-core
//!
//! Shared building blocks for the permitdesk backend:
//!
//! - [`cache`] - TTL cache with lazy expiry and pattern invalidation
//! - [`monitoring`] - process-wide performance counters
//! - [`principal`] - the authenticated user record

pub mod cache;
pub mod monitoring;
pub mod principal;

pub use cache::{CacheStats, TtlCache, cache_key};
pub use monitoring::{MetricsSnapshot, PerformanceMetrics};
pub use principal::{Principal, ROLE_ADMIN};
