//! HTTP API tests
//!
//! Exercise the router with tower's oneshot, including the full
//! create → submit-images → verified flow against a mock backend.

mod helpers;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use sqlx::SqlitePool;
use tower::ServiceExt;

use idv_common::config::{Settings, SettingsHandle};
use idv_ve::db;
use idv_ve::{build_router, AppState};

use helpers::*;

async fn test_app(settings: Settings) -> (Router, SqlitePool) {
    let pool = db::init_memory_pool().await.expect("pool");
    let state = AppState::new(pool.clone(), SettingsHandle::fixed(settings));
    (build_router(state), pool)
}

fn json_request(method: &str, uri: &str, api_key: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(key) = api_key {
        builder = builder.header("authorization", format!("Bearer {}", key));
    }
    builder
        .body(Body::from(body.to_string()))
        .expect("build request")
}

async fn response_json(response: axum::response::Response) -> Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("read body")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("json body")
}

#[tokio::test]
async fn health_reports_module_and_version() {
    let (app, _pool) = test_app(test_settings("http://127.0.0.1:1", None)).await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("health");
    assert_eq!(response.status(), StatusCode::OK);

    let body = response_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "idv-ve");
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn create_session_requires_a_known_api_key() {
    let (app, _pool) = test_app(test_settings("http://127.0.0.1:1", None)).await;

    let response = app
        .clone()
        .oneshot(json_request("POST", "/session", None, json!({})))
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .oneshot(json_request("POST", "/session", Some("wrong-key"), json!({})))
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn create_session_returns_the_new_record() {
    let (app, pool) = test_app(test_settings("http://127.0.0.1:1", None)).await;

    let response = app
        .oneshot(json_request(
            "POST",
            "/session",
            Some("test-key"),
            json!({ "vendor_id": "v-7" }),
        ))
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::OK);

    let body = response_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["status"], "NOT_STARTED");
    assert_eq!(body["data"]["vendor_id"], "v-7");

    let session_id = body["data"]["session_id"].as_str().expect("session_id");
    let session_url = body["data"]["session_url"].as_str().expect("session_url");
    assert!(session_url.ends_with(session_id));

    let stored = db::sessions::load_session(&pool, session_id)
        .await
        .expect("load")
        .expect("persisted");
    assert_eq!(stored.vendor_id.as_deref(), Some("v-7"));
}

#[tokio::test]
async fn get_unknown_session_is_404() {
    let (app, _pool) = test_app(test_settings("http://127.0.0.1:1", None)).await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/session/no-such-id")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn submit_images_validates_the_front_image() {
    let (app, _pool) = test_app(test_settings("http://127.0.0.1:1", None)).await;

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/session/no-such-id/images",
            None,
            json!({ "front_image": "" }),
        ))
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .oneshot(json_request(
            "POST",
            "/session/no-such-id/images",
            None,
            json!({ "front_image": "ZnJvbnQ=" }),
        ))
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn image_submission_drives_the_session_to_review() {
    let backend = spawn_recognition_backend(&passport_sse_body()).await;
    let (app, pool) = test_app(test_settings(&backend.base_url, None)).await;

    let response = app
        .clone()
        .oneshot(json_request("POST", "/session", Some("test-key"), json!({})))
        .await
        .expect("create");
    let body = response_json(response).await;
    let session_id = body["data"]["session_id"]
        .as_str()
        .expect("session_id")
        .to_string();

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/session/{}/images", session_id),
            None,
            json!({ "front_image": "ZnJvbnQ=", "back_image": "YmFjaw==" }),
        ))
        .await
        .expect("submit");
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["status"], "IN_PROGRESS");

    // The pipeline runs detached from the submission response.
    let mut reviewed = Value::Null;
    for _ in 0..50 {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/session/{}", session_id))
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("get");
        let body = response_json(response).await;
        if body["status"] == "IN_REVIEW" {
            reviewed = body;
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    }

    assert_eq!(reviewed["status"], "IN_REVIEW", "session never completed");
    assert_eq!(reviewed["document_type"], "PASSPORT");
    assert_eq!(reviewed["first_name"], "Jane");
    assert_eq!(reviewed["last_name"], "Doe");
    assert_eq!(reviewed["document_valid"], true);

    let stored = db::sessions::load_session(&pool, &session_id)
        .await
        .expect("load")
        .expect("exists");
    assert!(stored.id_image_front.is_none());
}
