//! API integration tests.

use axum::{
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use serde_json::Value;
use tower::ServiceExt;

use quill::api::create_router;
use quill_protocol::ServerEvent;
use tokio::sync::mpsc;

mod common;
use common::{ScriptedBackend, test_app, test_state};

/// Test that the health endpoint works.
#[tokio::test]
async fn test_health_endpoint() {
    let app = test_app().await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .method(Method::GET)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    let json: Value = serde_json::from_slice(&body).unwrap();

    assert_eq!(json["status"], "ok");
    assert!(json["version"].is_string());
}

/// Every route rejects a missing user key with 400.
#[tokio::test]
async fn test_missing_user_key_is_bad_request() {
    for (method, uri) in [
        (Method::GET, "/history"),
        (Method::POST, "/clearHistory"),
        (Method::GET, "/history?userId="),
    ] {
        let app = test_app().await;
        let response = app
            .oneshot(
                Request::builder()
                    .uri(uri)
                    .method(method.clone())
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(
            response.status(),
            StatusCode::BAD_REQUEST,
            "{method} {uri}"
        );
    }
}

/// History starts empty for a fresh key.
#[tokio::test]
async fn test_history_empty_for_new_key() {
    let app = test_app().await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/history?userId=fresh")
                .method(Method::GET)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json, serde_json::json!([]));
}

/// A completed turn is visible through the history route, and clearing
/// erases it idempotently.
#[tokio::test]
async fn test_history_round_trip_and_clear() {
    let state = test_state(ScriptedBackend::hello()).await;
    let app = create_router(state.clone());

    // Run one turn directly against the actor.
    let session = state.sessions.session("alice");
    let (tx, mut rx) = mpsc::channel(16);
    session.bind(tx).await.unwrap();
    session.send_prompt("hi".to_string()).await.unwrap();
    loop {
        match rx.recv().await {
            Some(ServerEvent::Done) | Some(ServerEvent::Error { .. }) | None => break,
            Some(_) => {}
        }
    }

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/history?userId=alice")
                .method(Method::GET)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    let json: Value = serde_json::from_slice(&body).unwrap();
    let messages = json.as_array().unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0]["role"], "user");
    assert_eq!(messages[0]["content"], "hi");
    assert_eq!(messages[1]["role"], "assistant");
    assert_eq!(messages[1]["content"], "Hello");
    assert!(messages[0]["timestamp"].is_i64());

    // Clear twice: both succeed.
    for _ in 0..2 {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/clearHistory?userId=alice")
                    .method(Method::POST)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["success"], true);
    }

    let response = app
        .oneshot(
            Request::builder()
                .uri("/history?userId=alice")
                .method(Method::GET)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json, serde_json::json!([]));
}

/// Clearing requires a mutating verb.
#[tokio::test]
async fn test_clear_with_wrong_verb_is_405() {
    let app = test_app().await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/clearHistory?userId=alice")
                .method(Method::GET)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

/// Unknown paths fall through to 404.
#[tokio::test]
async fn test_unknown_path_is_404() {
    let app = test_app().await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/nope?userId=alice")
                .method(Method::GET)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

/// The connect route refuses plain HTTP requests.
#[tokio::test]
async fn test_connect_without_upgrade_headers_rejected() {
    let app = test_app().await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/connect?userId=alice")
                .method(Method::GET)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert!(
        response.status() == StatusCode::BAD_REQUEST
            || response.status() == StatusCode::UPGRADE_REQUIRED,
        "got {}",
        response.status()
    );
}

/// Error responses carry the structured body.
#[tokio::test]
async fn test_error_body_shape() {
    let app = test_app().await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/history")
                .method(Method::GET)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["code"], "BAD_REQUEST");
    assert!(
        json["error"]
            .as_str()
            .unwrap()
            .contains("Missing userId query parameter")
    );
}

/// CORS headers are present on simple requests (permissive layer).
#[tokio::test]
async fn test_cors_headers_present() {
    let app = test_app().await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .method(Method::GET)
                .header(header::ORIGIN, "http://example.test")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert!(
        response
            .headers()
            .contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN)
    );
}
