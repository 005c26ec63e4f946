use axum::http::{Method, StatusCode};
use serde_json::json;
use serial_test::serial;
use uuid::Uuid;

use crate::auth::RoleName;
use crate::seed;
use crate::tests::fixtures::{seed_config_for, unique_email, TenantFixture, TEST_PASSWORD};
use crate::tests::helpers::{count_table_rows, get, send};
use crate::tests::TestContext;

#[tokio::test]
#[serial]
#[ignore = "requires postgres (TEST_DATABASE_URL or docker)"]
async fn test_seed_is_idempotent() {
    let ctx = TestContext::new().await;
    let config = seed_config_for(Uuid::new_v4(), &unique_email());

    let first = seed::run(&ctx.db_pool, &config).await.unwrap();
    assert!(first.organization_created);
    assert!(first.superuser_created);
    assert_eq!(first.roles_created, RoleName::ALL.len() as u64);
    assert!(first.permissions_created > 0);

    let second = seed::run(&ctx.db_pool, &config).await.unwrap();
    assert_eq!(second, seed::SeedReport::default());

    assert_eq!(count_table_rows(&ctx.db_pool, "users").await, 1);
    assert_eq!(
        count_table_rows(&ctx.db_pool, "roles").await,
        RoleName::ALL.len() as i64
    );
}

#[tokio::test]
#[serial]
#[ignore = "requires postgres (TEST_DATABASE_URL or docker)"]
async fn test_login_and_me() {
    let ctx = TestContext::new().await;
    let tenant = TenantFixture::seed(&ctx).await;
    let app = ctx.app();

    let login = send(
        &app,
        Method::POST,
        "/api/v1/auth/login",
        None,
        Some(json!({
            "email": tenant.admin_email.to_uppercase(),
            "password": TEST_PASSWORD,
            "organization_id": tenant.organization_id,
        })),
    )
    .await;
    assert_eq!(login.status, StatusCode::OK, "{}", login.body);
    assert_eq!(login.body["token_type"], "bearer");

    let token = login.body["access_token"].as_str().unwrap().to_string();
    let me = get(&app, "/api/v1/auth/me", &token).await;
    assert_eq!(me.status, StatusCode::OK);
    assert_eq!(me.body["email"], tenant.admin_email.as_str());
    assert!(me.body.get("password_hash").is_none());
    assert_eq!(me.body["roles"], json!(["Super Admin"]));

    let permissions = me.body["permissions"].as_array().unwrap();
    assert!(permissions.contains(&json!("vendor:create")));
    assert!(permissions.contains(&json!("bia_category_read")));
}

#[tokio::test]
#[serial]
#[ignore = "requires postgres (TEST_DATABASE_URL or docker)"]
async fn test_login_rejects_bad_credentials() {
    let ctx = TestContext::new().await;
    let tenant = TenantFixture::seed(&ctx).await;
    let app = ctx.app();

    let wrong_password = send(
        &app,
        Method::POST,
        "/api/v1/auth/login",
        None,
        Some(json!({
            "email": tenant.admin_email,
            "password": "not-the-password",
            "organization_id": tenant.organization_id,
        })),
    )
    .await;
    assert_eq!(wrong_password.status, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong_password.body["code"], "INVALID_CREDENTIALS");

    // Same credentials against another tenant
    let other = TenantFixture::seed(&ctx).await;
    let wrong_tenant = send(
        &app,
        Method::POST,
        "/api/v1/auth/login",
        None,
        Some(json!({
            "email": tenant.admin_email,
            "password": TEST_PASSWORD,
            "organization_id": other.organization_id,
        })),
    )
    .await;
    assert_eq!(wrong_tenant.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
#[serial]
#[ignore = "requires postgres (TEST_DATABASE_URL or docker)"]
async fn test_inactive_user_is_locked_out() {
    let ctx = TestContext::new().await;
    let tenant = TenantFixture::seed(&ctx).await;
    let auditor = tenant.user_with_role(&ctx, RoleName::InternalAuditor).await;
    let app = ctx.app();

    assert_eq!(get(&app, "/api/v1/auth/me", &auditor.token).await.status, StatusCode::OK);

    sqlx::query("UPDATE users SET is_active = FALSE WHERE id = $1")
        .bind(auditor.id)
        .execute(&ctx.db_pool)
        .await
        .unwrap();

    let response = get(&app, "/api/v1/auth/me", &auditor.token).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.message(), "Inactive user");

    let login = send(
        &app,
        Method::POST,
        "/api/v1/auth/login",
        None,
        Some(json!({
            "email": auditor.email,
            "password": TEST_PASSWORD,
            "organization_id": tenant.organization_id,
        })),
    )
    .await;
    assert_eq!(login.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
#[serial]
#[ignore = "requires postgres (TEST_DATABASE_URL or docker)"]
async fn test_health_with_database() {
    let ctx = TestContext::new().await;
    let app = ctx.app();

    let response = send(&app, Method::GET, "/health", None, None).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["status"], "healthy");

    let detailed = send(&app, Method::GET, "/health/detailed", None, None).await;
    assert_eq!(detailed.status, StatusCode::OK);
    assert_eq!(detailed.body["services"]["database"]["status"], "healthy");
}
