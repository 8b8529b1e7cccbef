//! Integration tests for the HTTP surface
//!
//! These tests drive the router end to end:
//! - Private URL resolution with and without subscribers
//! - Management API (create, list, delete)
//! - Error responses

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    response::IntoResponse,
    Router,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tempfile::NamedTempFile;
use tower::ServiceExt;

use privateurl::config::Settings;
use privateurl::database::{init_db, RecordStore};
use privateurl::dispatch::{Dispatcher, Notification};
use privateurl::lifecycle::{CreateOptions, PrivateUrls};
use privateurl::route::{create_app, AppState};

/// Helper function to create the manager with a temporary database
fn setup_urls(settings: Settings) -> (PrivateUrls, NamedTempFile) {
    let temp_db = NamedTempFile::new().expect("Failed to create temp file");
    let db_path = temp_db.path().to_str().unwrap();
    let db = init_db(db_path).expect("Failed to initialize test database");
    let urls = PrivateUrls::new(RecordStore::new(db), Arc::new(settings));
    (urls, temp_db)
}

fn setup_test_app() -> (Router, PrivateUrls, NamedTempFile) {
    let (urls, temp_db) = setup_urls(Settings::default());
    (create_app(AppState::new(urls.clone())), urls, temp_db)
}

/// App whose subscribers answer "ok"/"fail" for the `test` action
fn setup_app_with_subscribers() -> (Router, PrivateUrls, NamedTempFile) {
    let (urls, temp_db) = setup_urls(Settings::default());
    let dispatcher = Dispatcher::new(urls.clone())
        .on_success(|n: &Notification<'_>| (n.action == "test").then(|| "ok".into_response()))
        .on_failure(|n: &Notification<'_>| (n.action == "test").then(|| "fail".into_response()));
    (create_app(AppState::from_dispatcher(dispatcher)), urls, temp_db)
}

async fn response_json(body: Body) -> Value {
    let bytes = body
        .collect()
        .await
        .expect("Failed to read response body")
        .to_bytes();

    serde_json::from_slice(&bytes).expect("Failed to parse JSON")
}

async fn response_text(body: Body) -> String {
    let bytes = body
        .collect()
        .await
        .expect("Failed to read response body")
        .to_bytes();

    String::from_utf8(bytes.to_vec()).expect("Body is not UTF-8")
}

async fn get(app: &Router, uri: &str) -> axum::response::Response {
    app.clone()
        .oneshot(Request::builder().method("GET").uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

async fn post_json(app: &Router, uri: &str, payload: Value) -> axum::response::Response {
    app.clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(payload.to_string()))
                .unwrap(),
        )
        .await
        .unwrap()
}

#[tokio::test]
async fn test_receivers() {
    let (app, urls, _temp_db) = setup_app_with_subscribers();
    let record = urls.create("test", CreateOptions::default()).unwrap();
    let path = record.absolute_path("privateurl");

    let response = get(&app, &path).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response_text(response.into_body()).await, "ok");

    let response = get(&app, &path).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response_text(response.into_body()).await, "fail");

    let response = get(&app, &format!("/privateurl/none/{}", record.token)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_default_redirect_then_not_found() {
    let (app, urls, _temp_db) = setup_app_with_subscribers();
    let record = urls.create("test2", CreateOptions::default()).unwrap();
    let path = record.absolute_path("privateurl");

    let response = get(&app, &path).await;
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(response.headers().get("location").unwrap(), "/");

    let response = get(&app, &path).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_custom_namespace_and_redirect() {
    let settings = Settings {
        url_namespace: "purl".to_string(),
        default_redirect: "https://example.com/welcome".to_string(),
        ..Settings::default()
    };
    let (urls, _temp_db) = setup_urls(settings);
    let app = create_app(AppState::new(urls.clone()));
    let record = urls.create("confirm", CreateOptions::default()).unwrap();

    let response = get(&app, &record.absolute_path("purl")).await;
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(
        response.headers().get("location").unwrap(),
        "https://example.com/welcome"
    );

    let response = get(&app, &record.absolute_path("privateurl")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_invalid_slugs_are_not_found() {
    let (app, _urls, _temp_db) = setup_test_app();

    let too_long_token = "a".repeat(65);
    for uri in [
        "/privateurl/bad.action/abcdefgh".to_string(),
        "/privateurl/test/bad_token".to_string(),
        format!("/privateurl/test/{}", too_long_token),
    ] {
        let response = get(&app, &uri).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{}", uri);
    }
}

#[tokio::test]
async fn test_create_private_url() {
    let (app, urls, _temp_db) = setup_test_app();

    let response = post_json(
        &app,
        "/api/urls",
        json!({
            "action": "confirm-email",
            "owner": "user_123",
            "expire_in_secs": 3600,
            "payload": {"email": "user@example.com"},
            "hits_limit": 3,
            "token_size": 20,
            "dashed_piece_size": 0
        }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::CREATED);

    let body = response_json(response.into_body()).await;
    let token = body["token"].as_str().unwrap();
    assert_eq!(body["action"], "confirm-email");
    assert_eq!(token.len(), 20);
    assert_eq!(body["hits_limit"], 3);
    assert_eq!(
        body["url"],
        format!("http://localhost:8080/privateurl/confirm-email/{}", token)
    );

    let stored = urls.find("confirm-email", token).unwrap().unwrap();
    assert_eq!(stored.owner.as_deref(), Some("user_123"));
    assert_eq!(stored.payload, r#"{"email":"user@example.com"}"#);
    assert!(stored.expire.is_some());
}

#[tokio::test]
async fn test_create_with_defaults() {
    let (app, _urls, _temp_db) = setup_test_app();

    let response = post_json(&app, "/api/urls", json!({"action": "test"})).await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let body = response_json(response.into_body()).await;
    let token = body["token"].as_str().unwrap();
    assert!(token.len() >= 7 && token.len() <= 64);
    assert_eq!(body["hits_limit"], 1);
    assert_eq!(body["auto_delete"], false);
    assert!(body["expire"].is_null());
}

#[tokio::test]
async fn test_create_validation_errors() {
    let (app, _urls, _temp_db) = setup_test_app();

    for payload in [
        json!({"action": "test", "token_size": 0}),
        json!({"action": "test", "token_size": [36, 65]}),
        json!({"action": "test", "token_size": [60, 36]}),
        json!({"action": "test", "token_size": [10, 20, 30]}),
        json!({"action": "test", "token_size": "test"}),
        json!({"action": "test", "dashed_piece_size": -1}),
        json!({"action": "test", "dashed_piece_size": "test"}),
        json!({"action": "not valid"}),
        json!({"owner": "missing action"}),
    ] {
        let response = post_json(&app, "/api/urls", payload.clone()).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{}", payload);

        let body = response_json(response.into_body()).await;
        assert_eq!(body["error"], "VALIDATION_ERROR");
    }

    let response = get(&app, "/api/urls?action=test").await;
    let body = response_json(response.into_body()).await;
    assert_eq!(body["total_fetched"], 0);
}

#[tokio::test]
async fn test_create_with_replace_via_api() {
    let (app, urls, _temp_db) = setup_test_app();

    for _ in 0..2 {
        let response = post_json(
            &app,
            "/api/urls",
            json!({"action": "reset-password", "owner": "alice", "replace": true}),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    let records = urls.list(Some("reset-password"), Some("alice"), 0, 100).unwrap();
    assert_eq!(records.len(), 1);
}

#[tokio::test]
async fn test_list_private_urls() {
    let (app, urls, _temp_db) = setup_test_app();

    for _ in 0..3 {
        urls.create("listed", CreateOptions::default().owner("list_user")).unwrap();
    }
    urls.create("listed", CreateOptions::default().owner("other_user")).unwrap();
    urls.create("unrelated", CreateOptions::default()).unwrap();

    let response = get(&app, "/api/urls?action=listed&owner=list_user&page=1&limit=10").await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = response_json(response.into_body()).await;
    assert_eq!(body["total_fetched"], 3);
    assert_eq!(body["page"], 1);
    assert_eq!(body["limit"], 10);
    assert_eq!(body["data"][0]["used"], "0 / 1");
    assert_eq!(body["data"][0]["available"], true);

    let response = get(&app, "/api/urls?action=listed").await;
    let body = response_json(response.into_body()).await;
    assert_eq!(body["total_fetched"], 4);

    let response = get(&app, "/api/urls").await;
    let body = response_json(response.into_body()).await;
    assert_eq!(body["total_fetched"], 5);
}

#[tokio::test]
async fn test_list_pagination() {
    let (app, urls, _temp_db) = setup_test_app();

    for _ in 0..15 {
        urls.create("paged", CreateOptions::default()).unwrap();
    }

    let response = get(&app, "/api/urls?action=paged&page=1&limit=10").await;
    let body = response_json(response.into_body()).await;
    assert_eq!(body["total_fetched"], 10);

    let response = get(&app, "/api/urls?action=paged&page=2&limit=10").await;
    let body = response_json(response.into_body()).await;
    assert_eq!(body["total_fetched"], 5);
    assert_eq!(body["page"], 2);
}

#[tokio::test]
async fn test_list_shows_exhausted_records() {
    let (app, urls, _temp_db) = setup_test_app();
    let record = urls.create("used", CreateOptions::default()).unwrap();

    let response = get(&app, &record.absolute_path("privateurl")).await;
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);

    let response = get(&app, "/api/urls?action=used").await;
    let body = response_json(response.into_body()).await;
    assert_eq!(body["data"][0]["used"], "1 / 1");
    assert_eq!(body["data"][0]["available"], false);
    assert!(!body["data"][0]["first_hit"].is_null());
}

#[tokio::test]
async fn test_delete_with_owner() {
    let (app, urls, _temp_db) = setup_test_app();
    let record = urls.create("test", CreateOptions::default().owner("delete_user")).unwrap();

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/api/urls/test/{}?owner=wrong_user", record.token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/api/urls/test/{}?owner=delete_user", record.token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = response_json(response.into_body()).await;
    assert_eq!(body["deleted"], format!("test/{}", record.token));
    assert!(urls.find("test", &record.token).unwrap().is_none());
}

#[tokio::test]
async fn test_delete_not_found() {
    let (app, _urls, _temp_db) = setup_test_app();

    let response = app
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri("/api/urls/test/nonexistent")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = response_json(response.into_body()).await;
    assert_eq!(body["error"], "NOT_FOUND");
}

#[tokio::test]
async fn test_create_with_out_of_range_expiration() {
    let (app, _urls, _temp_db) = setup_test_app();

    let response = post_json(
        &app,
        "/api/urls",
        json!({"action": "test", "expire_in_secs": 9_000_000_000_000i64}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = response_json(response.into_body()).await;
    assert_eq!(body["error"], "VALIDATION_ERROR");

    let response = get(&app, "/api/urls?action=test").await;
    let body = response_json(response.into_body()).await;
    assert_eq!(body["total_fetched"], 0);
}

#[tokio::test]
async fn test_list_page_far_past_the_end() {
    let (app, urls, _temp_db) = setup_test_app();
    urls.create("paged", CreateOptions::default()).unwrap();

    let response = get(&app, &format!("/api/urls?action=paged&page={}&limit=100", usize::MAX)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = response_json(response.into_body()).await;
    assert_eq!(body["total_fetched"], 0);
    assert_eq!(body["data"], json!([]));
}
