use axum::http::StatusCode;
use serde_json::json;
use serial_test::serial;

use crate::auth::RoleName;
use crate::tests::fixtures::{location_body, TenantFixture};
use crate::tests::helpers::{delete, get, post, put};
use crate::tests::TestContext;

#[tokio::test]
#[serial]
#[ignore = "requires postgres (TEST_DATABASE_URL or docker)"]
async fn test_missing_permission_is_forbidden() {
    let ctx = TestContext::new().await;
    let tenant = TenantFixture::seed(&ctx).await;
    let user = tenant.user_with_role(&ctx, RoleName::User).await;
    let app = ctx.app();

    assert_eq!(get(&app, "/api/v1/locations", &user.token).await.status, StatusCode::OK);

    let response = post(&app, "/api/v1/locations", &user.token, location_body("Head Office")).await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
    assert_eq!(response.body["code"], "INSUFFICIENT_PERMISSIONS");
    assert_eq!(
        response.message(),
        "User does not have the required permissions: location:create."
    );

    assert_eq!(get(&app, "/api/v1/users", &user.token).await.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
#[serial]
#[ignore = "requires postgres (TEST_DATABASE_URL or docker)"]
async fn test_user_without_roles_is_forbidden() {
    let ctx = TestContext::new().await;
    let tenant = TenantFixture::seed(&ctx).await;
    let user = tenant.user_with_role(&ctx, RoleName::User).await;
    sqlx::query("DELETE FROM user_roles WHERE user_id = $1")
        .bind(user.id)
        .execute(&ctx.db_pool)
        .await
        .unwrap();

    let response = get(&ctx.app(), "/api/v1/departments", &user.token).await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
    assert_eq!(
        response.message(),
        "User has no assigned roles, and therefore no permissions."
    );
}

#[tokio::test]
#[serial]
#[ignore = "requires postgres (TEST_DATABASE_URL or docker)"]
async fn test_frameworks_are_gated_by_role() {
    let ctx = TestContext::new().await;
    let tenant = TenantFixture::seed(&ctx).await;
    let admin = tenant.user_with_role(&ctx, RoleName::Admin).await;
    let auditor = tenant.user_with_role(&ctx, RoleName::InternalAuditor).await;
    let manager = tenant.user_with_role(&ctx, RoleName::BcmManager).await;
    let app = ctx.app();

    // Admin holds every permission but no framework role
    let response = get(&app, "/api/v1/bia-frameworks", &admin.token).await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);

    assert_eq!(get(&app, "/api/v1/bia-frameworks", &auditor.token).await.status, StatusCode::OK);
    assert_eq!(get(&app, "/api/v1/bia-frameworks", &manager.token).await.status, StatusCode::OK);

    let body = json!({
        "name": "Default",
        "threshold": 3.0,
        "parameters": [{ "criterion_id": uuid::Uuid::new_v4(), "weightage": 100.0 }],
        "rtos": [{ "display_text": "4 hours", "value_in_hours": 4 }],
    });
    let response = post(&app, "/api/v1/bia-frameworks", &auditor.token, body).await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
    assert!(response.message().contains("Super Admin, BCM Manager, CISO"));
}

#[tokio::test]
#[serial]
#[ignore = "requires postgres (TEST_DATABASE_URL or docker)"]
async fn test_permission_catalog_and_custom_roles() {
    let ctx = TestContext::new().await;
    let tenant = TenantFixture::seed(&ctx).await;
    let app = ctx.app();

    let catalog = get(&app, "/api/v1/roles/permissions", &tenant.admin_token).await;
    assert_eq!(catalog.status, StatusCode::OK);
    let read_ids: Vec<_> = catalog
        .body
        .as_array()
        .unwrap()
        .iter()
        .filter(|p| p["name"] == "location:read" || p["name"] == "location:create")
        .map(|p| p["id"].clone())
        .collect();
    assert_eq!(read_ids.len(), 2);

    let created = post(
        &app,
        "/api/v1/roles",
        &tenant.admin_token,
        json!({ "name": "Site Lead", "permission_ids": read_ids }),
    )
    .await;
    assert_eq!(created.status, StatusCode::CREATED, "{}", created.body);
    assert_eq!(created.body["permissions"].as_array().unwrap().len(), 2);
    assert_eq!(created.body["is_system_role"], false);
    let role_id = created.id();

    let duplicate = post(&app, "/api/v1/roles", &tenant.admin_token, json!({ "name": "Site Lead" })).await;
    assert_eq!(duplicate.status, StatusCode::CONFLICT);

    let renamed = put(
        &app,
        &format!("/api/v1/roles/{}", role_id),
        &tenant.admin_token,
        json!({ "description": "Runs a single site", "permission_ids": [] }),
    )
    .await;
    assert_eq!(renamed.status, StatusCode::OK);
    assert!(renamed.body["permissions"].as_array().unwrap().is_empty());

    assert_eq!(
        delete(&app, &format!("/api/v1/roles/{}", role_id), &tenant.admin_token).await.status,
        StatusCode::OK
    );
    assert_eq!(
        get(&app, &format!("/api/v1/roles/{}", role_id), &tenant.admin_token).await.status,
        StatusCode::NOT_FOUND
    );
}

#[tokio::test]
#[serial]
#[ignore = "requires postgres (TEST_DATABASE_URL or docker)"]
async fn test_system_roles_cannot_be_deleted() {
    let ctx = TestContext::new().await;
    let tenant = TenantFixture::seed(&ctx).await;
    let app = ctx.app();

    let roles = get(&app, "/api/v1/roles", &tenant.admin_token).await;
    let system_role = roles.body["data"]
        .as_array()
        .unwrap()
        .iter()
        .find(|r| r["name"] == "User")
        .unwrap()["id"]
        .as_str()
        .unwrap()
        .to_string();

    let response = delete(&app, &format!("/api/v1/roles/{}", system_role), &tenant.admin_token).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.message(), "System roles cannot be deleted.");
}
