//! Admin-route authentication and CRUD scenarios.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod support;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn register_request(auth_header: Option<&str>) -> Request<Body> {
    let body = json!({
        "alias": "t",
        "api_key": "SECRET",
        "base_url": "https://example.com",
    });
    let mut builder = Request::builder()
        .method("POST")
        .uri("/keys/register")
        .header("content-type", "application/json");
    if let Some(header) = auth_header {
        builder = builder.header("authorization", header);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

#[tokio::test]
async fn register_without_authorization_header_is_rejected() {
    let (router, _state) = support::build_app();
    let response = router.oneshot(register_request(None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["message"], "Missing");
}

#[tokio::test]
async fn register_with_non_bearer_scheme_is_rejected() {
    let (router, _state) = support::build_app();
    let response = router
        .oneshot(register_request(Some("Basic xyz")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["message"], "Invalid Authorization format");
}

#[tokio::test]
async fn register_with_wrong_bearer_token_is_rejected() {
    let (router, _state) = support::build_app();
    let response = router
        .oneshot(register_request(Some("Bearer wrong")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["message"], "Invalid admin token");
}

#[tokio::test]
async fn register_with_correct_bearer_token_succeeds() {
    let (router, _state) = support::build_app();
    let auth = format!("Bearer {}", support::ADMIN_TOKEN);
    let response = router.oneshot(register_request(Some(&auth))).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn list_then_remove_then_list_excludes_alias() {
    let (router, _state) = support::build_app();
    let auth = format!("Bearer {}", support::ADMIN_TOKEN);

    router
        .clone()
        .oneshot(register_request(Some(&auth)))
        .await
        .unwrap();

    let list_response = router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/keys/list")
                .header("authorization", auth.clone())
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(list_response.status(), StatusCode::OK);
    let body = body_json(list_response).await;
    assert_eq!(body["count"], 1);

    let remove_response = router
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri("/keys/t")
                .header("authorization", auth.clone())
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(remove_response.status(), StatusCode::OK);

    let second_remove = router
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri("/keys/t")
                .header("authorization", auth)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(second_remove.status(), StatusCode::NOT_FOUND);
}
