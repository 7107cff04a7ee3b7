//! End-to-end tests of the gateway router over in-memory backends.

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use cachegate_api::{create_router, AppState, GatewayConfig, StaticTokenOrigin};
use cachegate_test_utils::{
    bearer, encode_endpoint, fixed_start, rs256_runner_token, runner_token, sample_object_key,
    MemoryObjectStore, MockFederation, StoreOp, TEST_AUDIENCE, TEST_ORIGIN, TEST_SCOPE,
    TEST_VERSION,
};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

const ROLE: &str = "arn:aws:iam::123456789012:role/cache-writer";

struct TestApp {
    router: Router,
    store: Arc<MemoryObjectStore>,
    federation: Arc<MockFederation>,
    origin: Arc<StaticTokenOrigin>,
}

fn test_app() -> TestApp {
    let store = Arc::new(MemoryObjectStore::new("mock-bucket"));
    let federation = Arc::new(MockFederation::new());
    let origin = Arc::new(StaticTokenOrigin::accepting());

    let mut config = GatewayConfig::new("mock-bucket", ROLE);
    config.part_wait_timeout = Some(Duration::from_secs(5));
    config.max_part_bytes = 1024;

    let state = AppState::new(config, store.clone(), federation.clone(), origin.clone());
    TestApp {
        router: create_router(state),
        store,
        federation,
        origin,
    }
}

fn authorized(method: Method, path: &str) -> axum::http::request::Builder {
    Request::builder()
        .method(method)
        .uri(path)
        .header(header::AUTHORIZATION, bearer(&runner_token(TEST_AUDIENCE, TEST_SCOPE)))
}

fn cache_path(suffix: &str) -> String {
    format!("/{}/_apis/artifactcache/{}", encode_endpoint(TEST_ORIGIN), suffix)
}

fn assume_role_path(key: &str, direction: &str) -> String {
    format!("/{}/assumeRole/{}/{}", encode_endpoint(TEST_ORIGIN), key, direction)
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = router
        .clone()
        .oneshot(request)
        .await
        .expect("router is infallible");
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body readable");
    (status, body.to_vec())
}

fn json(body: &[u8]) -> Value {
    serde_json::from_slice(body).expect("JSON body")
}

fn patch_part(cache_id: i64, start: u64, body: &'static [u8]) -> Request<Body> {
    let end = start + body.len() as u64 - 1;
    authorized(Method::PATCH, &cache_path(&format!("caches/{}", cache_id)))
        .header(header::CONTENT_RANGE, format!("bytes {}-{}/*", start, end))
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .body(Body::from(body))
        .expect("request")
}

async fn reserve(app: &TestApp, key: &str) -> i64 {
    let request = authorized(Method::POST, &cache_path("caches"))
        .body(Body::from(format!(r#"{{"key":"{}","version":"{}"}}"#, key, TEST_VERSION)))
        .expect("request");
    let (status, body) = send(&app.router, request).await;
    assert_eq!(status, StatusCode::CREATED);
    json(&body)["cacheId"].as_i64().expect("cacheId")
}

// ============================================================================
// UPLOAD FLOW
// ============================================================================

#[tokio::test]
async fn test_out_of_order_parts_are_stored_in_range_order() {
    let app = test_app();
    let cache_id = reserve(&app, "deps-linux").await;
    assert!(cache_id > 0);

    let third = tokio::spawn(send_owned(app.router.clone(), patch_part(cache_id, 6, b"ccc")));
    let second = tokio::spawn(send_owned(app.router.clone(), patch_part(cache_id, 3, b"bbb")));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(app.store.calls_for(StoreOp::UploadPart).is_empty());

    let (status, _) = send(&app.router, patch_part(cache_id, 0, b"aaa")).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(second.await.expect("join"), StatusCode::NO_CONTENT);
    assert_eq!(third.await.expect("join"), StatusCode::NO_CONTENT);

    let commit = authorized(Method::POST, &cache_path(&format!("caches/{}", cache_id)))
        .body(Body::empty())
        .expect("request");
    let (status, _) = send(&app.router, commit).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let completed = app.store.completed_uploads();
    assert_eq!(completed.len(), 1);
    assert_eq!(
        completed[0].path,
        sample_object_key("deps-linux").storage_path()
    );

    let parts = app.store.uploaded_parts(&completed[0].upload_id);
    let bodies: Vec<&[u8]> = parts.iter().map(|p| p.body.as_ref()).collect();
    assert_eq!(bodies, vec![&b"aaa"[..], &b"bbb"[..], &b"ccc"[..]]);

    let numbers: Vec<i32> = completed[0].parts.iter().map(|p| p.part_number).collect();
    assert_eq!(numbers, vec![1, 2, 3]);
    let etags: Vec<&str> = completed[0].parts.iter().map(|p| p.etag.as_str()).collect();
    let stored: Vec<&str> = parts.iter().map(|p| p.etag.as_str()).collect();
    assert_eq!(etags, stored);
}

async fn send_owned(router: Router, request: Request<Body>) -> StatusCode {
    send(&router, request).await.0
}

#[tokio::test]
async fn test_commit_twice_is_not_found() {
    let app = test_app();
    let cache_id = reserve(&app, "once").await;
    let (status, _) = send(&app.router, patch_part(cache_id, 0, b"x")).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let commit = || {
        authorized(Method::POST, &cache_path(&format!("caches/{}", cache_id)))
            .body(Body::empty())
            .expect("request")
    };
    assert_eq!(send(&app.router, commit()).await.0, StatusCode::NO_CONTENT);

    let (status, body) = send(&app.router, commit()).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json(&body)["code"], "SESSION_NOT_FOUND");
}

#[tokio::test]
async fn test_malformed_content_range_never_reaches_store() {
    let app = test_app();
    let cache_id = reserve(&app, "bad-range").await;

    let request = authorized(Method::PATCH, &cache_path(&format!("caches/{}", cache_id)))
        .header(header::CONTENT_RANGE, "bytes=0-9")
        .body(Body::from("0123456789"))
        .expect("request");
    let (status, body) = send(&app.router, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json(&body)["code"], "INVALID_FORMAT");
    assert!(app.store.calls_for(StoreOp::UploadPart).is_empty());
}

#[tokio::test]
async fn test_oversized_part_is_refused() {
    let app = test_app();
    let cache_id = reserve(&app, "big").await;

    let request = authorized(Method::PATCH, &cache_path(&format!("caches/{}", cache_id)))
        .header(header::CONTENT_RANGE, "bytes 0-2047/*")
        .body(Body::from(vec![0u8; 2048]))
        .expect("request");
    let (status, body) = send(&app.router, request).await;

    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(json(&body)["code"], "PAYLOAD_TOO_LARGE");
    assert!(app.store.calls_for(StoreOp::UploadPart).is_empty());
}

#[tokio::test]
async fn test_reserve_rejects_invalid_json() {
    let app = test_app();
    let request = authorized(Method::POST, &cache_path("caches"))
        .body(Body::from("{not json"))
        .expect("request");
    let (status, _) = send(&app.router, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(app.store.calls_for(StoreOp::CreateMultipart).is_empty());
}

#[tokio::test]
async fn test_session_is_invisible_to_other_scopes() {
    let app = test_app();
    let cache_id = reserve(&app, "private").await;
    let fork = bearer(&runner_token(TEST_AUDIENCE, "refs/pull/7/merge"));

    let mut patch = patch_part(cache_id, 0, b"evil");
    patch
        .headers_mut()
        .insert(header::AUTHORIZATION, fork.parse().expect("header value"));
    let (status, body) = send(&app.router, patch).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json(&body)["code"], "SESSION_NOT_FOUND");

    let commit = Request::builder()
        .method(Method::POST)
        .uri(cache_path(&format!("caches/{}", cache_id)))
        .header(header::AUTHORIZATION, fork)
        .body(Body::empty())
        .expect("request");
    let (status, _) = send(&app.router, commit).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(app.store.calls_for(StoreOp::UploadPart).is_empty());

    let commit = authorized(Method::POST, &cache_path(&format!("caches/{}", cache_id)))
        .body(Body::empty())
        .expect("request");
    assert_eq!(send(&app.router, commit).await.0, StatusCode::NO_CONTENT);
}

// ============================================================================
// AUTHENTICATION
// ============================================================================

#[tokio::test]
async fn test_malformed_endpoint_is_unauthorized() {
    let app = test_app();
    let request = authorized(Method::GET, "/%25%25%25/_apis/artifactcache/cache?keys=a")
        .body(Body::empty())
        .expect("request");
    let (status, body) = send(&app.router, request).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json(&body)["code"], "AUTH_MALFORMED");
    assert_eq!(app.origin.calls(), 0);
    assert_eq!(app.store.call_count(), 0);
}

#[tokio::test]
async fn test_missing_authorization_is_unauthorized() {
    let app = test_app();
    let request = Request::builder()
        .uri(cache_path("cache?keys=a"))
        .body(Body::empty())
        .expect("request");
    let (status, _) = send(&app.router, request).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(app.origin.calls(), 0);
}

#[tokio::test]
async fn test_rejected_token_is_unauthorized() {
    let app = test_app();
    app.origin.set_reject(true);

    let request = authorized(Method::GET, &cache_path("cache?keys=a"))
        .body(Body::empty())
        .expect("request");
    let (status, body) = send(&app.router, request).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json(&body)["code"], "AUTH_REJECTED");
    assert_eq!(app.store.call_count(), 0);
}

#[tokio::test]
async fn test_validation_is_reused_across_requests() {
    let app = test_app();
    for _ in 0..3 {
        let request = authorized(Method::GET, &cache_path("cache?keys=a"))
            .body(Body::empty())
            .expect("request");
        send(&app.router, request).await;
    }
    assert_eq!(app.origin.calls(), 1);
}

#[tokio::test]
async fn test_rs256_runner_token_reserves_upload() {
    let app = test_app();
    let request = Request::builder()
        .method(Method::POST)
        .uri(cache_path("caches"))
        .header(
            header::AUTHORIZATION,
            bearer(&rs256_runner_token(TEST_AUDIENCE, TEST_SCOPE)),
        )
        .body(Body::from(format!(r#"{{"key":"rs256","version":"{}"}}"#, TEST_VERSION)))
        .expect("request");
    let (status, body) = send(&app.router, request).await;

    assert_eq!(status, StatusCode::CREATED);
    assert!(json(&body)["cacheId"].as_i64().is_some());
    assert_eq!(app.origin.calls(), 1);
}

// ============================================================================
// LOOKUP
// ============================================================================

#[tokio::test]
async fn test_lookup_follows_restore_key_order() {
    let app = test_app();
    let older = sample_object_key("deps-older");
    let newer = sample_object_key("deps-newer");
    app.store.put_object(older.storage_path(), fixed_start());
    app.store.put_object(newer.storage_path(), fixed_start());

    let request = authorized(
        Method::GET,
        &cache_path(&format!(
            "cache?keys=deps-exact,deps-newer,deps-older&version={}",
            TEST_VERSION
        )),
    )
    .body(Body::empty())
    .expect("request");
    let (status, body) = send(&app.router, request).await;

    assert_eq!(status, StatusCode::OK);
    let entry = json(&body);
    assert_eq!(entry["cacheKey"], "deps-newer");
    assert_eq!(entry["cacheVersion"], TEST_VERSION);
    assert_eq!(entry["scope"], TEST_SCOPE);
    assert_eq!(entry["creationTime"], "2024-01-01T00:00:00Z");
    assert!(entry["archiveLocation"]
        .as_str()
        .is_some_and(|url| url.contains(&newer.storage_path())));
}

#[tokio::test]
async fn test_lookup_miss_is_no_content() {
    let app = test_app();
    let request = authorized(Method::GET, &cache_path("cache?keys=nothing,here"))
        .body(Body::empty())
        .expect("request");
    let (status, body) = send(&app.router, request).await;

    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(body.is_empty());
}

#[tokio::test]
async fn test_lookup_without_keys_is_bad_request() {
    let app = test_app();
    let request = authorized(Method::GET, &cache_path("cache"))
        .body(Body::empty())
        .expect("request");
    let (status, body) = send(&app.router, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json(&body)["code"], "MISSING_FIELD");
}

// ============================================================================
// CREDENTIALS
// ============================================================================

#[tokio::test]
async fn test_upload_credentials_are_scoped_to_one_object() {
    let app = test_app();
    let request = authorized(Method::GET, &assume_role_path("deps-linux", "upload"))
        .body(Body::empty())
        .expect("request");
    let (status, body) = send(&app.router, request).await;

    assert_eq!(status, StatusCode::OK);
    let path = cachegate_core::ObjectKey::new(TEST_AUDIENCE, TEST_SCOPE, "deps-linux", "")
        .storage_path();
    let response = json(&body);
    assert_eq!(response["ObjectS3URI"], format!("s3://mock-bucket/{}", path));
    assert_eq!(response["SecretAccessKey"], "mock-secret");
    assert!(response.get("CacheHit").is_none());

    let calls = app.federation.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].role_arn, ROLE);
    assert_eq!(calls[0].session_name, "7e3c1f0a-58b2-4d7e-9c61-2f4a9e0b1d35");
    assert!(calls[0].policy_json.contains(&path));
}

#[tokio::test]
async fn test_download_credentials_report_restore_hit() {
    let app = test_app();
    let fallback = cachegate_core::ObjectKey::new(TEST_AUDIENCE, TEST_SCOPE, "deps-", "");
    app.store.put_object(fallback.storage_path(), fixed_start());

    let request = authorized(
        Method::GET,
        &format!("{}?restoreKeys=deps-", assume_role_path("deps-abc", "download")),
    )
    .body(Body::empty())
    .expect("request");
    let (status, body) = send(&app.router, request).await;

    assert_eq!(status, StatusCode::OK);
    let response = json(&body);
    assert_eq!(response["CacheHit"], false);
    assert_eq!(
        response["ObjectS3URI"],
        format!("s3://mock-bucket/{}", fallback.storage_path())
    );
}

#[tokio::test]
async fn test_download_miss_issues_nothing() {
    let app = test_app();
    let request = authorized(Method::GET, &assume_role_path("absent", "download"))
        .body(Body::empty())
        .expect("request");
    let (status, _) = send(&app.router, request).await;

    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(app.federation.call_count(), 0);
}

#[tokio::test]
async fn test_federation_failure_is_server_error() {
    let app = test_app();
    app.federation.fail_with("AccessDenied");

    let request = authorized(Method::GET, &assume_role_path("deps", "upload"))
        .body(Body::empty())
        .expect("request");
    let (status, body) = send(&app.router, request).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let response = json(&body);
    assert_eq!(response["code"], "UPSTREAM_FAILURE");
    assert!(!response["message"]
        .as_str()
        .is_some_and(|m| m.contains("AccessDenied")));
}

// ============================================================================
// OPERATIONAL ROUTES
// ============================================================================

#[tokio::test]
async fn test_health_routes_need_no_token() {
    let app = test_app();

    let (status, body) = send(
        &app.router,
        Request::builder()
            .uri("/health/ping")
            .body(Body::empty())
            .expect("request"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"pong");

    let (status, body) = send(
        &app.router,
        Request::builder()
            .uri("/health/ready")
            .body(Body::empty())
            .expect("request"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let ready = json(&body);
    assert_eq!(ready["status"], "ready");
    assert_eq!(ready["gateway"]["bucket"], "mock-bucket");
    assert_eq!(ready["gateway"]["open_upload_sessions"], 0);
}

#[tokio::test]
async fn test_metrics_exposes_gateway_counters() {
    let app = test_app();
    let request = authorized(Method::GET, &cache_path("cache?keys=a"))
        .body(Body::empty())
        .expect("request");
    send(&app.router, request).await;

    let (status, body) = send(
        &app.router,
        Request::builder()
            .uri("/metrics")
            .body(Body::empty())
            .expect("request"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let text = String::from_utf8(body).expect("utf-8");
    assert!(text.contains("cachegate_http_requests_total"));
    assert!(text.contains("/:endpoint/_apis/artifactcache/cache"));
    assert!(!text.contains(&encode_endpoint(TEST_ORIGIN)));
}

#[tokio::test]
async fn test_unmatched_paths_share_one_metric_label() {
    let app = test_app();
    for i in 0..5 {
        let request = Request::builder()
            .uri(format!("/stray-{}-x/anything", i))
            .body(Body::empty())
            .expect("request");
        let (status, _) = send(&app.router, request).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    let (_, body) = send(
        &app.router,
        Request::builder()
            .uri("/metrics")
            .body(Body::empty())
            .expect("request"),
    )
    .await;
    let text = String::from_utf8(body).expect("utf-8");
    assert!(text.contains(r#"path="unmatched""#));
    assert!(!text.contains("stray-"));
}
