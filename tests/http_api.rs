use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use jsonwebtoken::{encode, EncodingKey, Header};
use notes_collab::config::Config;
use notes_collab::routes::create_app;
use notes_collab::AppState;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

const SECRET: &str = "http-secret";

fn app() -> axum::Router {
    let config = Config {
        cloud_auth_jwt_secret: Some(SECRET.to_string()),
        cloud_service_name: "notes-collab-test".to_string(),
        ..Config::default()
    };
    create_app(Arc::new(AppState::new(config)))
}

fn token(roles: &[&str]) -> String {
    let claims = json!({
        "sub": "u1",
        "exp": chrono::Utc::now().timestamp() + 600,
        "roles": roles,
    });
    encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap()
}

async fn get(app: axum::Router, uri: &str, token: Option<String>) -> (StatusCode, Value) {
    let mut req = Request::builder().uri(uri);
    if let Some(token) = token {
        req = req.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let resp = app.oneshot(req.body(Body::empty()).unwrap()).await.unwrap();
    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

#[tokio::test]
async fn health_reports_service_name() {
    let (status, body) = get(app(), "/api/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["service"], "notes-collab-test");
    assert_eq!(body["status"], "ok");

    let (status, _) = get(app(), "/api/ready", None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn diagnostics_requires_admin_token() {
    let (status, _) = get(app(), "/api/v1/diagnostics", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = get(app(), "/api/v1/diagnostics", Some(token(&["editor"]))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], 403);

    let (status, body) = get(app(), "/api/v1/diagnostics", Some(token(&["admin"]))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["n_topics"], 0);
    assert_eq!(body["n_conn"], 0);
}

#[tokio::test]
async fn openapi_document_is_served() {
    let (status, body) = get(app(), "/api-docs/openapi.json", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["paths"].get("/api/v1/diagnostics").is_some());
}
