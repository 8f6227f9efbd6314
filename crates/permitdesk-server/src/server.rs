use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::FromRef;
use axum::routing::{delete, get, put};
use axum::{Router, middleware};
use permitdesk_auth::{AuthState, JwtService, PrincipalResolver};
use permitdesk_core::{PerformanceMetrics, TtlCache};
use permitdesk_db_memory::MemoryConnector;
use permitdesk_db_postgres::PgConnector;
use permitdesk_storage::{CachedQueries, Connector, PoolManager, QueryExecutor};
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::{AppConfig, StorageBackend};
use crate::{handlers, memory, middleware as app_middleware};

/// Everything handlers share. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub pool: Arc<PoolManager>,
    pub queries: CachedQueries,
    pub resolver: Arc<PrincipalResolver>,
    pub metrics: Arc<PerformanceMetrics>,
}

impl FromRef<AppState> for AuthState {
    fn from_ref(state: &AppState) -> Self {
        AuthState::new(Arc::clone(&state.resolver))
    }
}

impl AppState {
    /// Builds the state for the backend named in the configuration.
    pub fn from_config(config: AppConfig) -> anyhow::Result<Self> {
        let connector: Arc<dyn Connector> = match config.storage.backend {
            StorageBackend::Postgres => {
                tracing::info!(
                    url = %config.storage.postgres.display_url(),
                    pool_size = config.storage.postgres.pool_size,
                    "Using PostgreSQL storage"
                );
                Arc::new(PgConnector::new(config.storage.postgres.clone()))
            }
            StorageBackend::Memory => {
                tracing::info!(
                    users = config.storage.memory.users.len(),
                    "Using in-memory storage"
                );
                Arc::new(MemoryConnector::new(memory::users_database(
                    &config.storage.memory.users,
                )))
            }
        };
        Self::new(config, connector)
    }

    /// Wires pool, caches and resolver around `connector`.
    ///
    /// No connection is opened here; the pool is created on first use.
    pub fn new(config: AppConfig, connector: Arc<dyn Connector>) -> anyhow::Result<Self> {
        let jwt = JwtService::new(config.auth.jwt_secret.as_bytes())?
            .with_leeway(Duration::from_secs(config.auth.leeway_secs));
        let metrics = Arc::new(PerformanceMetrics::new());
        let pool =
            Arc::new(PoolManager::new(connector).with_retry_after(config.storage.pool_retry()));
        let executor = QueryExecutor::new(Arc::clone(&pool));

        let queries = CachedQueries::new(
            executor.clone(),
            Arc::new(TtlCache::new("queries", config.cache.query_ttl())),
            Arc::clone(&metrics),
        );
        let resolver = Arc::new(PrincipalResolver::new(
            Arc::new(jwt),
            executor,
            Arc::new(TtlCache::new("principals", config.cache.principal_ttl())),
            Arc::clone(&metrics),
        ));

        Ok(Self {
            config: Arc::new(config),
            pool,
            queries,
            resolver,
            metrics,
        })
    }
}

pub fn build_app(state: AppState) -> Router {
    let body_limit = state.config.server.body_limit_bytes;
    Router::new()
        .route("/health", get(handlers::health))
        .route("/stats/performance", get(handlers::performance_stats))
        .route("/metrics", get(handlers::prometheus_metrics))
        .route("/users/me", get(handlers::current_user))
        .route("/users/me/phone", put(handlers::update_phone))
        .route("/users/list", get(handlers::list_users))
        .route("/users/by-role/{role}", get(handlers::users_by_role))
        .route("/admin/cache", delete(handlers::flush_caches))
        // Middleware stack (outermost last): trace -> compression/cors -> request id -> timing
        .layer(middleware::from_fn(app_middleware::performance))
        .layer(middleware::from_fn(app_middleware::request_id))
        .layer(CorsLayer::permissive())
        .layer(CompressionLayer::new())
        .layer(
            TraceLayer::new_for_http().make_span_with(|req: &axum::http::Request<_>| {
                let req_id = req
                    .headers()
                    .get(&app_middleware::X_REQUEST_ID)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("")
                    .to_string();
                tracing::info_span!(
                    "http.request",
                    http.method = %req.method(),
                    http.target = %req.uri(),
                    request_id = %req_id
                )
            }),
        )
        .layer(axum::extract::DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

pub struct PermitdeskServer {
    addr: SocketAddr,
    state: AppState,
}

impl PermitdeskServer {
    pub fn new(state: AppState) -> Self {
        Self {
            addr: state.config.addr(),
            state,
        }
    }

    /// Tests the database, serves until Ctrl+C, then closes the pool.
    ///
    /// A failed connection test is logged and startup continues; requests
    /// degrade to direct connections until the pool can be created.
    pub async fn run(self) -> anyhow::Result<()> {
        self.state.pool.test_connection().await;

        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!("listening on {}", self.addr);

        let pool = Arc::clone(&self.state.pool);
        let served = axum::serve(listener, build_app(self.state))
            .with_graceful_shutdown(shutdown_signal())
            .await;

        pool.close().await;
        served?;
        Ok(())
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
