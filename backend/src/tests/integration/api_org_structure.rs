use axum::http::StatusCode;
use serde_json::json;
use serial_test::serial;
use uuid::Uuid;

use crate::auth::RoleName;
use crate::tests::fixtures::{department_body, location_body, process_body, unique_email, TenantFixture, TEST_PASSWORD};
use crate::tests::helpers::{delete, get, post, put};
use crate::tests::TestContext;

#[tokio::test]
#[serial]
#[ignore = "requires postgres (TEST_DATABASE_URL or docker)"]
async fn test_location_lifecycle() {
    let ctx = TestContext::new().await;
    let tenant = TenantFixture::seed(&ctx).await;
    let app = ctx.app();
    let token = &tenant.admin_token;

    let created = post(&app, "/api/v1/locations", token, location_body("Head Office")).await;
    assert_eq!(created.status, StatusCode::CREATED, "{}", created.body);
    assert_eq!(created.body["organization_id"], json!(tenant.organization_id));
    assert_eq!(created.body["created_by_id"], json!(tenant.admin_id));
    let id = created.id();

    let duplicate = post(&app, "/api/v1/locations", token, location_body("Head Office")).await;
    assert_eq!(duplicate.status, StatusCode::CONFLICT);
    assert_eq!(
        duplicate.message(),
        "Location with name 'Head Office' already exists in this organization."
    );

    // Explicit null clears, omitted keys are kept
    let updated = put(
        &app,
        &format!("/api/v1/locations/{}", id),
        token,
        json!({ "city": null, "postal_code": "1000-001" }),
    )
    .await;
    assert_eq!(updated.status, StatusCode::OK);
    assert!(updated.body["city"].is_null());
    assert_eq!(updated.body["country"], "PT");
    assert_eq!(updated.body["postal_code"], "1000-001");

    let deleted = delete(&app, &format!("/api/v1/locations/{}", id), token).await;
    assert_eq!(deleted.status, StatusCode::OK);
    assert_eq!(deleted.body["is_active"], false);

    let again = delete(&app, &format!("/api/v1/locations/{}", id), token).await;
    assert_eq!(again.status, StatusCode::OK);

    let missing = get(&app, &format!("/api/v1/locations/{}", id), token).await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
    assert_eq!(missing.message(), "Location not found");

    // The name is free again once the old row is inactive
    let recreated = post(&app, "/api/v1/locations", token, location_body("Head Office")).await;
    assert_eq!(recreated.status, StatusCode::CREATED);
}

#[tokio::test]
#[serial]
#[ignore = "requires postgres (TEST_DATABASE_URL or docker)"]
async fn test_list_pagination_and_sorting() {
    let ctx = TestContext::new().await;
    let tenant = TenantFixture::seed(&ctx).await;
    let app = ctx.app();

    for name in ["Bravo", "Alpha", "Charlie"] {
        let response = post(&app, "/api/v1/locations", &tenant.admin_token, location_body(name)).await;
        assert_eq!(response.status, StatusCode::CREATED);
    }

    let page = get(&app, "/api/v1/locations?skip=1&limit=1", &tenant.admin_token).await;
    assert_eq!(page.status, StatusCode::OK);
    assert_eq!(page.body["meta"]["total"], 3);
    assert_eq!(page.body["meta"]["page"], 2);
    assert_eq!(page.body["meta"]["has_next"], true);
    assert_eq!(page.body["meta"]["has_prev"], true);
    assert_eq!(page.body["data"][0]["name"], "Bravo");

    let sorted = get(&app, "/api/v1/locations?sort_by=name&sort_order=desc", &tenant.admin_token).await;
    assert_eq!(sorted.body["data"][0]["name"], "Charlie");

    // Unknown sort fields fall back to the default
    let fallback = get(&app, "/api/v1/locations?sort_by=password_hash", &tenant.admin_token).await;
    assert_eq!(fallback.status, StatusCode::OK);
    assert_eq!(fallback.body["data"][0]["name"], "Alpha");

    let far = get(&app, "/api/v1/locations?skip=9223372036854775807", &tenant.admin_token).await;
    assert_eq!(far.status, StatusCode::OK);
    assert_eq!(far.body["data"], json!([]));
    assert_eq!(far.body["meta"]["has_next"], false);

    let far_page = get(&app, "/api/v1/locations?page=9223372036854775807&size=1000", &tenant.admin_token).await;
    assert_eq!(far_page.status, StatusCode::OK);
    assert_eq!(far_page.body["meta"]["total"], 3);
}

#[tokio::test]
#[serial]
#[ignore = "requires postgres (TEST_DATABASE_URL or docker)"]
async fn test_tenants_are_isolated() {
    let ctx = TestContext::new().await;
    let first = TenantFixture::seed(&ctx).await;
    let second = TenantFixture::seed(&ctx).await;
    let app = ctx.app();

    let location = post(&app, "/api/v1/locations", &first.admin_token, location_body("Depot")).await;
    let id = location.id();

    let other = get(&app, &format!("/api/v1/locations/{}", id), &second.admin_token).await;
    assert_eq!(other.status, StatusCode::NOT_FOUND);

    let hijack = put(
        &app,
        &format!("/api/v1/locations/{}", id),
        &second.admin_token,
        json!({ "name": "Mine now" }),
    )
    .await;
    assert_eq!(hijack.status, StatusCode::NOT_FOUND);

    let list = get(&app, "/api/v1/locations", &second.admin_token).await;
    assert_eq!(list.body["meta"]["total"], 0);

    // Same name is fine in another tenant
    let same_name = post(&app, "/api/v1/locations", &second.admin_token, location_body("Depot")).await;
    assert_eq!(same_name.status, StatusCode::CREATED);

    // Linking a foreign location is refused
    let department = post(
        &app,
        "/api/v1/departments",
        &second.admin_token,
        department_body("Finance", &[id]),
    )
    .await;
    assert_eq!(department.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
#[serial]
#[ignore = "requires postgres (TEST_DATABASE_URL or docker)"]
async fn test_department_links_and_soft_delete() {
    let ctx = TestContext::new().await;
    let tenant = TenantFixture::seed(&ctx).await;
    let app = ctx.app();
    let token = &tenant.admin_token;

    let lisbon = post(&app, "/api/v1/locations", token, location_body("Lisbon")).await.id();
    let porto = post(&app, "/api/v1/locations", token, location_body("Porto")).await.id();

    let created = post(&app, "/api/v1/departments", token, department_body("Operations", &[lisbon])).await;
    assert_eq!(created.status, StatusCode::CREATED, "{}", created.body);
    assert_eq!(created.body["locations"].as_array().unwrap().len(), 1);
    let id = created.id();

    let duplicate = post(&app, "/api/v1/departments", token, department_body("Operations", &[])).await;
    assert_eq!(duplicate.status, StatusCode::CONFLICT);

    let relinked = put(
        &app,
        &format!("/api/v1/departments/{}", id),
        token,
        json!({ "location_ids": [lisbon, porto, porto] }),
    )
    .await;
    assert_eq!(relinked.status, StatusCode::OK);
    assert_eq!(relinked.body["locations"].as_array().unwrap().len(), 2);

    let bad_head = put(
        &app,
        &format!("/api/v1/departments/{}", id),
        token,
        json!({ "department_head_id": Uuid::new_v4() }),
    )
    .await;
    assert_eq!(bad_head.status, StatusCode::NOT_FOUND);

    let deleted = delete(&app, &format!("/api/v1/departments/{}", id), token).await;
    assert_eq!(deleted.status, StatusCode::OK);
    assert_eq!(deleted.body["is_deleted"], true);
    assert!(deleted.body["deleted_at"].is_string());

    assert_eq!(
        delete(&app, &format!("/api/v1/departments/{}", id), token).await.status,
        StatusCode::OK
    );
    assert_eq!(
        get(&app, &format!("/api/v1/departments/{}", id), token).await.status,
        StatusCode::NOT_FOUND
    );
}

#[tokio::test]
#[serial]
#[ignore = "requires postgres (TEST_DATABASE_URL or docker)"]
async fn test_process_rules() {
    let ctx = TestContext::new().await;
    let tenant = TenantFixture::seed(&ctx).await;
    let app = ctx.app();
    let token = &tenant.admin_token;

    let inside = post(&app, "/api/v1/locations", token, location_body("Main Site")).await.id();
    let outside = post(&app, "/api/v1/locations", token, location_body("Remote Site")).await.id();
    let department = post(&app, "/api/v1/departments", token, department_body("Treasury", &[inside])).await;
    let department_id = department.id();

    let mut body = process_body("Payroll", department_id);
    body["location_ids"] = json!([outside]);
    let rejected = post(&app, "/api/v1/processes", token, body).await;
    assert_eq!(rejected.status, StatusCode::BAD_REQUEST);
    assert_eq!(
        rejected.message(),
        "One or more process locations are not associated with the selected department."
    );

    let mut body = process_body("Payroll", department_id);
    body["location_ids"] = json!([inside]);
    let payroll = post(&app, "/api/v1/processes", token, body).await;
    assert_eq!(payroll.status, StatusCode::CREATED, "{}", payroll.body);
    assert_eq!(payroll.body["locations"][0]["id"], json!(inside));
    let payroll_id = payroll.id();

    let duplicate = post(&app, "/api/v1/processes", token, process_body("Payroll", department_id)).await;
    assert_eq!(duplicate.status, StatusCode::CONFLICT);
    assert_eq!(
        duplicate.message(),
        "A process with the name 'Payroll' already exists in the department 'Treasury'."
    );

    let mut body = process_body("Reconciliation", department_id);
    body["upstream_dependency_ids"] = json!([payroll_id]);
    let reconciliation = post(&app, "/api/v1/processes", token, body).await;
    assert_eq!(reconciliation.status, StatusCode::CREATED);
    assert_eq!(reconciliation.body["upstream_dependencies"][0]["name"], "Payroll");

    let self_dependency = put(
        &app,
        &format!("/api/v1/processes/{}", payroll_id),
        token,
        json!({ "downstream_dependency_ids": [payroll_id] }),
    )
    .await;
    assert_eq!(self_dependency.status, StatusCode::BAD_REQUEST);
    assert_eq!(self_dependency.message(), "A process cannot depend on itself.");

    let unknown_app = put(
        &app,
        &format!("/api/v1/processes/{}", payroll_id),
        token,
        json!({ "application_ids": [Uuid::new_v4()] }),
    )
    .await;
    assert_eq!(unknown_app.status, StatusCode::NOT_FOUND);

    let deleted = delete(&app, &format!("/api/v1/processes/{}", payroll_id), token).await;
    assert_eq!(deleted.status, StatusCode::OK);
    assert_eq!(deleted.body["is_deleted"], true);
    assert_eq!(
        get(&app, &format!("/api/v1/processes/{}", payroll_id), token).await.status,
        StatusCode::NOT_FOUND
    );
}

#[tokio::test]
#[serial]
#[ignore = "requires postgres (TEST_DATABASE_URL or docker)"]
async fn test_deleted_links_drop_out_of_reads() {
    let ctx = TestContext::new().await;
    let tenant = TenantFixture::seed(&ctx).await;
    let app = ctx.app();
    let token = &tenant.admin_token;

    let kept = post(&app, "/api/v1/locations", token, location_body("Data Centre")).await.id();
    let closed = post(&app, "/api/v1/locations", token, location_body("Branch")).await.id();
    let department_id = post(&app, "/api/v1/departments", token, department_body("Operations", &[kept, closed]))
        .await
        .id();
    let application_id = post(&app, "/api/v1/applications", token, json!({ "name": "Ledger" })).await.id();

    let mut body = process_body("Settlement", department_id);
    body["location_ids"] = json!([kept, closed]);
    body["application_ids"] = json!([application_id]);
    let process = post(&app, "/api/v1/processes", token, body).await;
    assert_eq!(process.status, StatusCode::CREATED, "{}", process.body);
    assert_eq!(process.body["locations"].as_array().unwrap().len(), 2);
    let process_id = process.id();

    assert_eq!(delete(&app, &format!("/api/v1/locations/{}", closed), token).await.status, StatusCode::OK);
    assert_eq!(
        delete(&app, &format!("/api/v1/applications/{}", application_id), token).await.status,
        StatusCode::OK
    );

    let department = get(&app, &format!("/api/v1/departments/{}", department_id), token).await;
    assert_eq!(department.body["locations"].as_array().unwrap().len(), 1);
    assert_eq!(department.body["locations"][0]["id"], json!(kept));

    let process = get(&app, &format!("/api/v1/processes/{}", process_id), token).await;
    assert_eq!(process.body["locations"].as_array().unwrap().len(), 1);
    assert_eq!(process.body["locations"][0]["id"], json!(kept));
    assert_eq!(process.body["applications"], json!([]));
}

#[tokio::test]
#[serial]
#[ignore = "requires postgres (TEST_DATABASE_URL or docker)"]
async fn test_department_keeps_locations_used_by_processes() {
    let ctx = TestContext::new().await;
    let tenant = TenantFixture::seed(&ctx).await;
    let app = ctx.app();
    let token = &tenant.admin_token;

    let used = post(&app, "/api/v1/locations", token, location_body("Plant")).await.id();
    let spare = post(&app, "/api/v1/locations", token, location_body("Warehouse")).await.id();
    let department_id = post(&app, "/api/v1/departments", token, department_body("Manufacturing", &[used, spare]))
        .await
        .id();

    let mut body = process_body("Assembly", department_id);
    body["location_ids"] = json!([used]);
    let process_id = post(&app, "/api/v1/processes", token, body).await.id();

    let rejected = put(
        &app,
        &format!("/api/v1/departments/{}", department_id),
        token,
        json!({ "location_ids": [] }),
    )
    .await;
    assert_eq!(rejected.status, StatusCode::BAD_REQUEST);
    assert_eq!(
        rejected.message(),
        "One or more locations are still used by processes in this department."
    );

    // Unused locations can still be dropped
    let trimmed = put(
        &app,
        &format!("/api/v1/departments/{}", department_id),
        token,
        json!({ "location_ids": [used] }),
    )
    .await;
    assert_eq!(trimmed.status, StatusCode::OK, "{}", trimmed.body);
    assert_eq!(trimmed.body["locations"].as_array().unwrap().len(), 1);

    // Deleted processes no longer pin their locations
    assert_eq!(delete(&app, &format!("/api/v1/processes/{}", process_id), token).await.status, StatusCode::OK);
    let emptied = put(
        &app,
        &format!("/api/v1/departments/{}", department_id),
        token,
        json!({ "location_ids": [] }),
    )
    .await;
    assert_eq!(emptied.status, StatusCode::OK);
    assert_eq!(emptied.body["locations"], json!([]));
}

#[tokio::test]
#[serial]
#[ignore = "requires postgres (TEST_DATABASE_URL or docker)"]
async fn test_user_management() {
    let ctx = TestContext::new().await;
    let tenant = TenantFixture::seed(&ctx).await;
    let app = ctx.app();
    let token = &tenant.admin_token;

    let roles = get(&app, "/api/v1/roles", token).await;
    let auditor_role = roles.body["data"]
        .as_array()
        .unwrap()
        .iter()
        .find(|r| r["name"] == RoleName::InternalAuditor.as_str())
        .map(|r| r["id"].clone())
        .unwrap();

    let email = unique_email();
    let body = json!({
        "first_name": "Ada",
        "last_name": "Lovelace",
        "email": email.to_uppercase(),
        "password": TEST_PASSWORD,
        "role_ids": [auditor_role],
    });
    let created = post(&app, "/api/v1/users", token, body.clone()).await;
    assert_eq!(created.status, StatusCode::CREATED, "{}", created.body);
    assert_eq!(created.body["email"], email.as_str());
    assert!(created.body.get("password_hash").is_none());
    assert_eq!(created.body["roles"][0]["name"], "Internal Auditor");
    let id = created.id();

    let duplicate = post(&app, "/api/v1/users", token, body).await;
    assert_eq!(duplicate.status, StatusCode::CONFLICT);

    let unknown_role = post(
        &app,
        "/api/v1/users",
        token,
        json!({
            "first_name": "Grace",
            "last_name": "Hopper",
            "email": unique_email(),
            "password": TEST_PASSWORD,
            "role_ids": [Uuid::new_v4()],
        }),
    )
    .await;
    assert_eq!(unknown_role.status, StatusCode::UNPROCESSABLE_ENTITY);

    let myself = delete(&app, &format!("/api/v1/users/{}", tenant.admin_id), token).await;
    assert_eq!(myself.status, StatusCode::BAD_REQUEST);

    let deactivated = delete(&app, &format!("/api/v1/users/{}", id), token).await;
    assert_eq!(deactivated.status, StatusCode::OK);
    assert_eq!(deactivated.body["is_active"], false);
}

#[tokio::test]
#[serial]
#[ignore = "requires postgres (TEST_DATABASE_URL or docker)"]
async fn test_current_organization() {
    let ctx = TestContext::new().await;
    let tenant = TenantFixture::seed(&ctx).await;
    let other = TenantFixture::seed(&ctx).await;
    let app = ctx.app();

    let current = get(&app, "/api/v1/organizations/me", &tenant.admin_token).await;
    assert_eq!(current.status, StatusCode::OK);
    assert_eq!(current.body["id"], json!(tenant.organization_id));

    let updated = put(
        &app,
        "/api/v1/organizations/me",
        &tenant.admin_token,
        json!({ "industry": "Banking" }),
    )
    .await;
    assert_eq!(updated.status, StatusCode::OK);
    assert_eq!(updated.body["industry"], "Banking");

    let other_name = get(&app, "/api/v1/organizations/me", &other.admin_token).await.body["name"].clone();
    let clash = put(
        &app,
        "/api/v1/organizations/me",
        &tenant.admin_token,
        json!({ "name": other_name }),
    )
    .await;
    assert_eq!(clash.status, StatusCode::CONFLICT);
}
