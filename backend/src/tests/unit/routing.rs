use axum::http::{Method, StatusCode};
use serde_json::json;
use uuid::Uuid;

use crate::auth::jwt::create_access_token;
use crate::config::AuthConfig;
use crate::tests::helpers::{create_test_jwt, offline_app, send};

#[tokio::test]
async fn test_root_banner() {
    let app = offline_app();
    let response = send(&app, Method::GET, "/", None, None).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body, json!("BCMS API v1"));
}

#[tokio::test]
async fn test_responses_carry_request_id() {
    let app = offline_app();
    let response = send(&app, Method::GET, "/", None, None).await;

    assert!(response.headers.contains_key("x-request-id"));
}

#[tokio::test]
async fn test_missing_token_is_rejected() {
    let app = offline_app();
    let response = send(&app, Method::GET, "/api/v1/locations", None, None).await;

    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.body["code"], "UNAUTHORIZED");
    assert_eq!(response.message(), "Not authenticated");
}

#[tokio::test]
async fn test_trailing_slash_reaches_collection_routes() {
    let app = offline_app();

    let with_slash = send(&app, Method::POST, "/api/v1/departments/", None, Some(json!({}))).await;
    let without_slash = send(&app, Method::POST, "/api/v1/departments", None, Some(json!({}))).await;
    assert_eq!(with_slash.status, StatusCode::UNAUTHORIZED);
    assert_eq!(with_slash.status, without_slash.status);

    let listed = send(&app, Method::GET, "/api/v1/bia-parameters/timeframes/", None, None).await;
    assert_eq!(listed.status, StatusCode::UNAUTHORIZED);
    assert_eq!(listed.message(), "Not authenticated");
}

#[tokio::test]
async fn test_non_bearer_scheme_is_rejected() {
    let app = offline_app();
    let request = axum::http::Request::builder()
        .uri("/api/v1/processes")
        .header("authorization", "Basic dXNlcjpwYXNz")
        .body(axum::body::Body::empty())
        .unwrap();

    let response = tower::ServiceExt::oneshot(app, request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["message"], "Invalid authorization format");
}

#[tokio::test]
async fn test_garbage_token_is_rejected() {
    let app = offline_app();
    let response = send(&app, Method::GET, "/api/v1/vendors", Some("not.a.jwt"), None).await;

    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.message(), "Could not validate credentials");
}

#[tokio::test]
async fn test_token_signed_with_other_secret_is_rejected() {
    let app = offline_app();
    let token = create_access_token(Uuid::new_v4(), Uuid::new_v4(), &AuthConfig::new("someone-else", 30))
        .unwrap()
        .token;

    let response = send(&app, Method::GET, "/api/v1/departments", Some(&token), None).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_expired_token_is_rejected() {
    let app = offline_app();
    let token = create_access_token(
        Uuid::new_v4(),
        Uuid::new_v4(),
        &AuthConfig::new(crate::tests::TEST_JWT_SECRET, -10),
    )
    .unwrap()
    .token;

    let response = send(&app, Method::GET, "/api/v1/users", Some(&token), None).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.body["code"], "TOKEN_EXPIRED");
}

#[tokio::test]
async fn test_write_routes_authenticate_before_reading_body() {
    let app = offline_app();
    let response = send(
        &app,
        Method::POST,
        "/api/v1/bia-frameworks",
        None,
        Some(json!({ "name": "" })),
    )
    .await;

    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_login_validation_lists_fields() {
    let app = offline_app();
    let response = send(
        &app,
        Method::POST,
        "/api/v1/auth/login",
        None,
        Some(json!({ "email": "", "password": "" })),
    )
    .await;

    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(response.body["code"], "VALIDATION_ERROR");
    assert!(response.body["details"]["email"].is_array());
    assert!(response.body["details"]["password"].is_array());
}

#[tokio::test]
async fn test_login_with_malformed_json() {
    let app = offline_app();
    let request = axum::http::Request::builder()
        .method(Method::POST)
        .uri("/api/v1/auth/login")
        .header("content-type", "application/json")
        .body(axum::body::Body::from("{\"email\": "))
        .unwrap();

    let response = tower::ServiceExt::oneshot(app, request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_health_reports_unreachable_database() {
    let app = offline_app();

    let response = send(&app, Method::GET, "/health", None, None).await;
    assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(response.body["status"], "unhealthy");
    assert_eq!(response.body["service"], "bcms-api");

    let detailed = send(&app, Method::GET, "/health/detailed", None, None).await;
    assert_eq!(detailed.status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let app = offline_app();
    let token = create_test_jwt(Uuid::new_v4(), Uuid::new_v4());
    let response = send(&app, Method::GET, "/api/v1/tickets", Some(&token), None).await;

    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_malformed_path_id_is_rejected() {
    let app = offline_app();
    let response = send(&app, Method::GET, "/api/v1/locations/not-a-uuid", None, None).await;

    assert!(response.status.is_client_error());
}
