//! HTTP-level tests against the router with no live browser.
//!
//! Everything here exercises the error mapping and the empty-catalog
//! behavior; tests that need a real Chromium live in their own harnesses.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

use pilothouse::config::Config;
use pilothouse::server::{router, AppState};

fn test_router() -> axum::Router {
    router(AppState::new(Config::default()))
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn post_empty(uri: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_reports_ok() {
    let response = test_router().oneshot(get("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["server"], "pilothouse");
}

#[tokio::test]
async fn empty_catalog_serializes_to_empty_tree() {
    let response = test_router().oneshot(get("/catalog")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body, json!({ "browsers": [] }));
}

#[tokio::test]
async fn page_actions_without_active_page_are_conflict() {
    let app = test_router();

    let response = app
        .clone()
        .oneshot(post("/page/goto", json!({ "url": "https://example.com" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = body_json(response).await;
    assert!(body["error"].as_str().unwrap().contains("page"));

    let response = app.clone().oneshot(get("/page/url")).await.unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = app
        .oneshot(post("/page/click", json!({ "selector": "#go" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn context_creation_needs_an_active_browser() {
    let response = test_router()
        .oneshot(post("/context", json!({})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = body_json(response).await;
    assert!(body["error"].as_str().unwrap().contains("browser"));
}

#[tokio::test]
async fn page_creation_needs_an_active_context() {
    let response = test_router()
        .oneshot(post("/page", json!({ "url": "https://example.com" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn switch_browser_with_bad_index_is_rejected() {
    let response = test_router()
        .oneshot(post("/switch/browser", json!({ "index": 0 })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert!(body["error"].as_str().unwrap().contains("out of range"));
}

#[tokio::test]
async fn switch_context_without_browser_is_conflict() {
    let response = test_router()
        .oneshot(post("/switch/context", json!({ "index": 0 })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn switch_page_without_browser_is_conflict() {
    let response = test_router()
        .oneshot(post(
            "/switch/page",
            json!({ "id": "page-1", "timeout_ms": 50 }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn close_succeeds_with_nothing_open() {
    let app = test_router();

    for uri in ["/page/close", "/context/close", "/browser/close"] {
        let response = app.clone().oneshot(post_empty(uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK, "{uri}");

        // Explicit ids that never existed are also fine
        let id = json!({ "id": uri.trim_start_matches('/').replace("/close", "") + "-99" });
        let response = app.clone().oneshot(post(uri, id)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK, "{uri} with id");
    }

    let response = app.oneshot(post_empty("/browser/close-all")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn close_with_malformed_id_is_rejected() {
    let response = test_router()
        .oneshot(post("/page/close", json!({ "id": "not-a-page-id" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn cookie_access_needs_an_active_context() {
    let response = test_router()
        .oneshot(get("/context/cookies"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn unknown_routes_are_not_found() {
    let response = test_router().oneshot(get("/frobnicate")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
