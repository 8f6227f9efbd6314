//! Extractor behaviour through a real axum router.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use axum::body::{Body, to_bytes};
use axum::extract::FromRef;
use axum::http::{Request, StatusCode, header};
use axum::routing::get;
use axum::{Json, Router};
use permitdesk_auth::{AdminAuth, AuthState, BearerAuth, JwtService, PRINCIPAL_BY_CODE, PrincipalResolver};
use permitdesk_core::{PerformanceMetrics, Principal, TtlCache};
use permitdesk_db_memory::{MemoryConnector, MemoryDatabase, MemoryOutput};
use permitdesk_storage::{PoolManager, QueryExecutor, Row};
use serde_json::Value;
use tower::ServiceExt;

const SECRET: &[u8] = b"extractor-secret";

#[derive(Clone)]
struct AppState {
    auth: AuthState,
}

impl FromRef<AppState> for AuthState {
    fn from_ref(state: &AppState) -> Self {
        state.auth.clone()
    }
}

async fn me(BearerAuth(principal): BearerAuth) -> Json<Principal> {
    Json((*principal).clone())
}

async fn admin(AdminAuth(principal): AdminAuth) -> String {
    format!("hello {}", principal.code)
}

fn setup() -> (Router, Arc<MemoryDatabase>) {
    let db = MemoryDatabase::new();
    db.seed(
        "users",
        [
            Row::new()
                .with("code", "u42")
                .with("name", "Dana")
                .with("role", "admin"),
            Row::new()
                .with("code", "u7")
                .with("name", "Eli")
                .with("role", "inspector"),
        ],
    );
    db.on(PRINCIPAL_BY_CODE, |tables, params| {
        let found = tables
            .get("users")
            .into_iter()
            .flatten()
            .filter(|row| row.get("code") == params.first())
            .cloned();
        Ok(MemoryOutput::rows(found))
    });

    let executor = QueryExecutor::new(Arc::new(PoolManager::new(Arc::new(
        MemoryConnector::new(Arc::clone(&db)),
    ))));
    let resolver = PrincipalResolver::new(
        Arc::new(JwtService::new(SECRET).unwrap()),
        executor,
        Arc::new(TtlCache::new("principals", Duration::from_secs(300))),
        Arc::new(PerformanceMetrics::new()),
    );

    let state = AppState {
        auth: AuthState::new(Arc::new(resolver)),
    };
    let app = Router::new()
        .route("/me", get(me))
        .route("/admin", get(admin))
        .with_state(state);
    (app, db)
}

fn bearer(subject: &str) -> String {
    let token = JwtService::new(SECRET)
        .unwrap()
        .issue(subject, Duration::from_secs(1800))
        .unwrap();
    format!("Bearer {token}")
}

async fn send(app: Router, uri: &str, authorization: Option<String>) -> (StatusCode, Value, Option<String>) {
    let mut request = Request::builder().uri(uri);
    if let Some(value) = authorization {
        request = request.header(header::AUTHORIZATION, value);
    }
    let response = app
        .oneshot(request.body(Body::empty()).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let challenge = response
        .headers()
        .get(header::WWW_AUTHENTICATE)
        .map(|v| v.to_str().unwrap().to_string());
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body, challenge)
}

#[tokio::test]
async fn test_valid_token_yields_principal() {
    let (app, _) = setup();

    let (status, body, _) = send(app, "/me", Some(bearer("u42"))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["code"], "u42");
    assert_eq!(body["name"], "Dana");
}

#[tokio::test]
async fn test_missing_and_bad_credentials_are_generic_401() {
    let (app, db) = setup();

    for authorization in [None, Some("Bearer nonsense".to_string()), Some(bearer("ghost"))] {
        let (status, body, challenge) = send(app.clone(), "/me", authorization).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["message"], "not authenticated");
        assert_eq!(challenge.as_deref(), Some("Bearer realm=\"permitdesk\""));
    }

    // Only the well-formed token for an unknown user reached the database.
    assert_eq!(db.executions(PRINCIPAL_BY_CODE), 1);
}

#[tokio::test]
async fn test_admin_route_requires_admin_role() {
    let (app, _) = setup();

    let (status, _, _) = send(app.clone(), "/admin", Some(bearer("u7"))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _, _) = send(app, "/admin", Some(bearer("u42"))).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_database_down_is_503_without_details() {
    let (app, db) = setup();
    db.faults.fail_pool_creation.store(true, Ordering::SeqCst);
    db.faults.fail_direct.store(true, Ordering::SeqCst);

    let (status, body, challenge) = send(app, "/me", Some(bearer("u42"))).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["message"], "service unavailable");
    assert!(challenge.is_none());
}
