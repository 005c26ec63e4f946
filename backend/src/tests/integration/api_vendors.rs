use axum::http::StatusCode;
use serde_json::json;
use serial_test::serial;

use crate::auth::RoleName;
use crate::tests::fixtures::TenantFixture;
use crate::tests::helpers::{delete, get, post, put};
use crate::tests::TestContext;

#[tokio::test]
#[serial]
#[ignore = "requires postgres (TEST_DATABASE_URL or docker)"]
async fn test_vendor_lifecycle() {
    let ctx = TestContext::new().await;
    let tenant = TenantFixture::seed(&ctx).await;
    let ciso = tenant.user_with_role(&ctx, RoleName::Ciso).await;
    let app = ctx.app();
    let token = &ciso.token;

    let created = post(
        &app,
        "/api/v1/vendors",
        token,
        json!({
            "name": "Acme Hosting",
            "contact_email": "ops@acme.example",
            "service_provided": "Colocation",
        }),
    )
    .await;
    assert_eq!(created.status, StatusCode::CREATED, "{}", created.body);
    assert_eq!(created.body["criticality"], "MEDIUM");
    let id = created.id();

    let duplicate = post(&app, "/api/v1/vendors", token, json!({ "name": "Acme Hosting" })).await;
    assert_eq!(duplicate.status, StatusCode::CONFLICT);
    assert_eq!(
        duplicate.message(),
        "A vendor with the name 'Acme Hosting' already exists in your organization."
    );

    let bad_email = put(
        &app,
        &format!("/api/v1/vendors/{}", id),
        token,
        json!({ "contact_email": "not-an-email" }),
    )
    .await;
    assert_eq!(bad_email.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(bad_email.body["details"]["contact_email"].is_array());

    let updated = put(
        &app,
        &format!("/api/v1/vendors/{}", id),
        token,
        json!({ "criticality": "CRITICAL", "service_provided": null }),
    )
    .await;
    assert_eq!(updated.status, StatusCode::OK);
    assert_eq!(updated.body["criticality"], "CRITICAL");
    assert!(updated.body["service_provided"].is_null());
    assert_eq!(updated.body["contact_email"], "ops@acme.example");
    assert_eq!(updated.body["updated_by_id"], serde_json::json!(ciso.id));

    let deleted = delete(&app, &format!("/api/v1/vendors/{}", id), token).await;
    assert_eq!(deleted.status, StatusCode::OK);
    assert_eq!(deleted.body["is_active"], false);

    assert_eq!(
        get(&app, &format!("/api/v1/vendors/{}", id), token).await.status,
        StatusCode::NOT_FOUND
    );

    let inactive = put(
        &app,
        &format!("/api/v1/vendors/{}", id),
        token,
        json!({ "name": "Acme Cloud" }),
    )
    .await;
    assert_eq!(inactive.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        inactive.message(),
        format!("Vendor with ID {} is inactive and cannot be updated.", id)
    );
}

#[tokio::test]
#[serial]
#[ignore = "requires postgres (TEST_DATABASE_URL or docker)"]
async fn test_unknown_criticality_is_rejected() {
    let ctx = TestContext::new().await;
    let tenant = TenantFixture::seed(&ctx).await;
    let app = ctx.app();

    let response = post(
        &app,
        "/api/v1/vendors",
        &tenant.admin_token,
        json!({ "name": "Globex", "criticality": "EXTREME" }),
    )
    .await;
    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
#[serial]
#[ignore = "requires postgres (TEST_DATABASE_URL or docker)"]
async fn test_auditor_reads_but_cannot_write_vendors() {
    let ctx = TestContext::new().await;
    let tenant = TenantFixture::seed(&ctx).await;
    let auditor = tenant.user_with_role(&ctx, RoleName::InternalAuditor).await;
    let app = ctx.app();

    assert_eq!(get(&app, "/api/v1/vendors", &auditor.token).await.status, StatusCode::OK);

    let response = post(&app, "/api/v1/vendors", &auditor.token, json!({ "name": "Initech" })).await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
}
