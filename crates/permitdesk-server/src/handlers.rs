use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use axum::Json;
use permitdesk_auth::{AdminAuth, BearerAuth};
use permitdesk_core::{CacheStats, MetricsSnapshot, Principal};
use permitdesk_storage::{PoolManagerStatus, QueryResult, Row};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::metrics;
use crate::server::AppState;
use crate::users::{self, USERS_GROUP};

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    database: PoolManagerStatus,
}

/// Pool status. `degraded` until the pool exists, 503 once it is closed.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let database = state.pool.status();
    let (code, status) = if database.closed {
        (StatusCode::SERVICE_UNAVAILABLE, "closed")
    } else if database.initialized {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::OK, "degraded")
    };
    (code, Json(HealthResponse { status, database }))
}

#[derive(Serialize)]
pub struct PerformanceStats {
    metrics: MetricsSnapshot,
    cache_hit_rate: f64,
    error_rate: f64,
    caches: CachesStats,
    pool: PoolManagerStatus,
}

#[derive(Serialize)]
pub struct CachesStats {
    principals: CacheStats,
    queries: CacheStats,
}

pub async fn performance_stats(State(state): State<AppState>) -> Json<PerformanceStats> {
    let snapshot = state.metrics.snapshot();
    Json(PerformanceStats {
        cache_hit_rate: snapshot.cache_hit_rate(),
        error_rate: snapshot.error_rate(),
        metrics: snapshot,
        caches: CachesStats {
            principals: state.resolver.cache_stats(),
            queries: state.queries.stats(),
        },
        pool: state.pool.status(),
    })
}

/// Prometheus text exposition.
pub async fn prometheus_metrics(State(state): State<AppState>) -> impl IntoResponse {
    metrics::record_pool_status(&state.pool.status());
    metrics::record_cache_stats("principals", &state.resolver.cache_stats());
    metrics::record_cache_stats("queries", &state.queries.stats());

    match metrics::render_metrics() {
        Some(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        ),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            [(header::CONTENT_TYPE, "text/plain")],
            "metrics exporter not installed\n".to_string(),
        ),
    }
}

pub async fn current_user(BearerAuth(principal): BearerAuth) -> Json<Principal> {
    Json(Principal::clone(&principal))
}

pub async fn list_users(
    State(state): State<AppState>,
    _auth: BearerAuth,
) -> Result<Json<Vec<Row>>, ApiError> {
    let (name, statement) = users::list_users();
    let result = state.queries.fetch(&name, &statement).await?;
    Ok(Json(rows(&result)))
}

pub async fn users_by_role(
    State(state): State<AppState>,
    _auth: BearerAuth,
    Path(role): Path<String>,
) -> Result<Json<Vec<Row>>, ApiError> {
    let (name, statement) = users::users_by_role(&role);
    let result = state.queries.fetch(&name, &statement).await?;
    Ok(Json(rows(&result)))
}

#[derive(Debug, Deserialize)]
pub struct PhoneUpdate {
    pub phone: String,
}

/// Updates the caller's phone and drops every cached copy of their record.
pub async fn update_phone(
    State(state): State<AppState>,
    BearerAuth(principal): BearerAuth,
    Json(update): Json<PhoneUpdate>,
) -> Result<Json<Principal>, ApiError> {
    let phone = update.phone.trim();
    if phone.is_empty() {
        return Err(ApiError::BadRequest("phone must not be empty".into()));
    }

    state
        .queries
        .executor()
        .execute(&users::update_phone(&principal.code, phone))
        .await?;

    state.resolver.invalidate(&principal.code);
    let dropped = state.queries.invalidate_matching(USERS_GROUP);
    tracing::info!(subject = %principal.code, dropped, "Phone updated");

    let fresh = state
        .resolver
        .lookup(&principal.code)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("user {} no longer exists", principal.code)))?;
    Ok(Json(fresh))
}

/// Flushes both cache namespaces.
pub async fn flush_caches(
    State(state): State<AppState>,
    AdminAuth(admin): AdminAuth,
) -> Json<serde_json::Value> {
    let principals = state.resolver.cache_stats().size;
    let queries = state.queries.stats().size;
    state.resolver.clear_cache();
    state.queries.clear();

    tracing::info!(admin = %admin.code, principals, queries, "Caches flushed");
    Json(serde_json::json!({
        "cleared": { "principals": principals, "queries": queries }
    }))
}

fn rows(result: &Arc<QueryResult>) -> Vec<Row> {
    QueryResult::clone(result).into_rows()
}
