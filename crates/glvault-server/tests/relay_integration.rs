//! End-to-end `POST /proxy` scenarios, exercising the full Axum router
//! in-process against a mock upstream.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod support;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn register(router: &axum::Router, alias: &str, api_key: &str, base_url: &str, quota_limit: u64) {
    let body = json!({
        "alias": alias,
        "api_key": api_key,
        "base_url": base_url,
        "quota_limit": quota_limit,
    });
    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/keys/register")
                .header("content-type", "application/json")
                .header("authorization", format!("Bearer {}", support::ADMIN_TOKEN))
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
}

fn proxy_request(alias: &str, method: &str, path: &str, nonce: &str) -> Request<Body> {
    let timestamp = support::now_ms();
    let signature = support::sign(alias, method, path, timestamp, nonce);
    let body = json!({
        "alias": alias,
        "method": method,
        "path": path,
        "timestamp": timestamp,
        "nonce": nonce,
    });
    Request::builder()
        .method("POST")
        .uri("/proxy")
        .header("content-type", "application/json")
        .header("authorization", format!("Signature {signature}"))
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn happy_path_relays_and_injects_credential() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/data/2.5/weather"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"temp": 21}))
                .insert_header("content-type", "application/json"),
        )
        .mount(&mock_server)
        .await;

    let (router, _state) = support::build_app();
    register(&router, "weather", "APIKEY1", &mock_server.uri(), 5).await;

    let request = proxy_request("weather", "GET", "/data/2.5/weather?q=Tokyo", "n1");
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["remaining_quota"], 4);
    assert_eq!(body["status"], 200);

    let received = mock_server.received_requests().await.unwrap();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].url.query(), Some("q=Tokyo&api_key=APIKEY1"));
}

#[tokio::test]
async fn stale_timestamp_is_rejected_without_auditing() {
    let mock_server = MockServer::start().await;
    let (router, state) = support::build_app();
    register(&router, "weather", "APIKEY1", &mock_server.uri(), 5).await;

    let timestamp = support::now_ms() - 31_000;
    let signature = support::sign("weather", "GET", "/x", timestamp, "n1");
    let body = json!({
        "alias": "weather",
        "method": "GET",
        "path": "/x",
        "timestamp": timestamp,
        "nonce": "n1",
    });
    let request = Request::builder()
        .method("POST")
        .uri("/proxy")
        .header("content-type", "application/json")
        .header("authorization", format!("Signature {signature}"))
        .body(Body::from(body.to_string()))
        .unwrap();

    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert!(body["message"].as_str().unwrap().to_lowercase().contains("stale")
        || body["message"].as_str().unwrap().to_lowercase().contains("expired"));

    let stats = state.audit.stats("weather", None).await.unwrap();
    assert_eq!(stats.total_requests, 0);

    let record = state.store.get_record("weather").await.unwrap().unwrap();
    assert_eq!(record.quota_used, 0);
}

#[tokio::test]
async fn quota_exhaustion_returns_429_on_third_request() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ping"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .mount(&mock_server)
        .await;

    let (router, state) = support::build_app();
    register(&router, "x", "K", &mock_server.uri(), 2).await;

    let r1 = router.clone().oneshot(proxy_request("x", "GET", "/ping", "n1")).await.unwrap();
    assert_eq!(r1.status(), StatusCode::OK);

    let r2 = router.clone().oneshot(proxy_request("x", "GET", "/ping", "n2")).await.unwrap();
    assert_eq!(r2.status(), StatusCode::OK);

    let r3 = router.clone().oneshot(proxy_request("x", "GET", "/ping", "n3")).await.unwrap();
    assert_eq!(r3.status(), StatusCode::TOO_MANY_REQUESTS);
    let body = body_json(r3).await;
    assert_eq!(body["error"], "RATE_LIMITED");
    assert_eq!(body["remaining"], 0);

    let entries = state
        .audit
        .query("x", glvault_core::QueryWindow::default())
        .await
        .unwrap();
    assert_eq!(entries.len(), 3);
    let last = entries.iter().max_by_key(|e| e.timestamp).unwrap();
    assert_eq!(last.status, 429);
    assert_eq!(last.error.as_deref(), Some("Rate limit exceeded"));
}

#[tokio::test]
async fn rotation_preserves_quota_and_uses_new_credential() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ping"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .mount(&mock_server)
        .await;

    let (router, state) = support::build_app();
    register(&router, "r", "OLD", &mock_server.uri(), 10).await;

    let first = router.clone().oneshot(proxy_request("r", "GET", "/ping", "n1")).await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let rotate_body = json!({"alias": "r", "new_api_key": "NEW"});
    let rotate_response = router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/keys/rotate")
                .header("content-type", "application/json")
                .header("authorization", format!("Bearer {}", support::ADMIN_TOKEN))
                .body(Body::from(rotate_body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(rotate_response.status(), StatusCode::OK);

    let second = router.clone().oneshot(proxy_request("r", "GET", "/ping", "n2")).await.unwrap();
    assert_eq!(second.status(), StatusCode::OK);

    assert_eq!(state.store.get_plaintext("r").await.unwrap().as_deref(), Some("NEW"));
    let record = state.store.get_record("r").await.unwrap().unwrap();
    assert_eq!(record.quota_used, 2);
    assert!(record.rotated_at.unwrap() >= record.created_at);

    let received = mock_server.received_requests().await.unwrap();
    let last = received.last().unwrap();
    assert!(last.url.query().unwrap().contains("api_key=NEW"));
}
