use axum::http::StatusCode;
use serde_json::json;
use serial_test::serial;
use uuid::Uuid;

use crate::auth::RoleName;
use crate::tests::fixtures::{criterion_body, TenantFixture};
use crate::tests::helpers::{delete, get, post, put};
use crate::tests::TestContext;

#[tokio::test]
#[serial]
#[ignore = "requires postgres (TEST_DATABASE_URL or docker)"]
async fn test_categories_are_audited_and_case_insensitive() {
    let ctx = TestContext::new().await;
    let tenant = TenantFixture::seed(&ctx).await;
    let app = ctx.app();
    let token = &tenant.admin_token;

    let created = post(&app, "/api/v1/bia-categories", token, json!({ "name": "Financial" })).await;
    assert_eq!(created.status, StatusCode::CREATED, "{}", created.body);
    assert_eq!(created.body["created_by"]["email"], tenant.admin_email.as_str());
    assert_eq!(created.body["updated_by"]["id"], json!(tenant.admin_id));
    let id = created.id();

    let duplicate = post(&app, "/api/v1/bia-categories", token, json!({ "name": "FINANCIAL" })).await;
    assert_eq!(duplicate.status, StatusCode::CONFLICT);
    assert_eq!(
        duplicate.message(),
        "A BIA category with the name 'FINANCIAL' already exists in this organization."
    );

    assert_eq!(
        delete(&app, &format!("/api/v1/bia-categories/{}", id), token).await.status,
        StatusCode::OK
    );
    assert_eq!(
        get(&app, &format!("/api/v1/bia-categories/{}", id), token).await.status,
        StatusCode::NOT_FOUND
    );
}

#[tokio::test]
#[serial]
#[ignore = "requires postgres (TEST_DATABASE_URL or docker)"]
async fn test_impact_scale_levels() {
    let ctx = TestContext::new().await;
    let tenant = TenantFixture::seed(&ctx).await;
    let app = ctx.app();
    let token = &tenant.admin_token;

    let duplicate_levels = post(
        &app,
        "/api/v1/bia-parameters/impact-scales",
        token,
        json!({
            "scale_name": "Severity",
            "levels": [
                { "level_value": 1, "level_name": "Low" },
                { "level_value": 1, "level_name": "High" },
            ],
        }),
    )
    .await;
    assert_eq!(duplicate_levels.status, StatusCode::BAD_REQUEST);
    assert_eq!(
        duplicate_levels.message(),
        "Duplicate level value or name within the same impact scale."
    );

    let zero_level = post(
        &app,
        "/api/v1/bia-parameters/impact-scales",
        token,
        json!({ "scale_name": "Severity", "levels": [{ "level_value": 0, "level_name": "None" }] }),
    )
    .await;
    assert_eq!(zero_level.status, StatusCode::UNPROCESSABLE_ENTITY);

    let created = post(
        &app,
        "/api/v1/bia-parameters/impact-scales",
        token,
        json!({
            "scale_name": "Severity",
            "levels": [
                { "level_value": 3, "level_name": "High" },
                { "level_value": 1, "level_name": "Low" },
            ],
        }),
    )
    .await;
    assert_eq!(created.status, StatusCode::CREATED, "{}", created.body);
    assert_eq!(created.body["levels"][0]["level_name"], "Low");
    assert_eq!(created.body["levels"][1]["level_value"], 3);
    let id = created.id();

    // Replacing levels may reuse the names of the old ones
    let replaced = put(
        &app,
        &format!("/api/v1/bia-parameters/impact-scales/{}", id),
        token,
        json!({ "levels": [{ "level_value": 2, "level_name": "Low" }] }),
    )
    .await;
    assert_eq!(replaced.status, StatusCode::OK, "{}", replaced.body);
    assert_eq!(replaced.body["levels"].as_array().unwrap().len(), 1);
    assert_eq!(replaced.body["levels"][0]["level_value"], 2);

    let deleted = delete(&app, &format!("/api/v1/bia-parameters/impact-scales/{}", id), token).await;
    assert_eq!(deleted.status, StatusCode::OK);
    assert_eq!(deleted.body["is_deleted"], true);
    assert_eq!(deleted.body["levels"].as_array().unwrap().len(), 1);
    assert_eq!(deleted.body["levels"][0]["is_deleted"], true);

    let again = delete(&app, &format!("/api/v1/bia-parameters/impact-scales/{}", id), token).await;
    assert_eq!(again.status, StatusCode::OK);
    assert_eq!(again.body["levels"][0]["level_value"], 2);
    assert_eq!(
        get(&app, &format!("/api/v1/bia-parameters/impact-scales/{}", id), token).await.status,
        StatusCode::NOT_FOUND
    );
}

#[tokio::test]
#[serial]
#[ignore = "requires postgres (TEST_DATABASE_URL or docker)"]
async fn test_timeframes_follow_sequence_order() {
    let ctx = TestContext::new().await;
    let tenant = TenantFixture::seed(&ctx).await;
    let app = ctx.app();
    let token = &tenant.admin_token;

    for (name, order) in [("1 week", 3), ("4 hours", 1), ("1 day", 2)] {
        let response = post(
            &app,
            "/api/v1/bia-parameters/timeframes",
            token,
            json!({ "timeframe_name": name, "sequence_order": order }),
        )
        .await;
        assert_eq!(response.status, StatusCode::CREATED);
    }

    let list = get(&app, "/api/v1/bia-parameters/timeframes", token).await;
    let names: Vec<&str> = list.body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["timeframe_name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["4 hours", "1 day", "1 week"]);

    let duplicate = post(
        &app,
        "/api/v1/bia-parameters/timeframes",
        token,
        json!({ "timeframe_name": "1 day" }),
    )
    .await;
    assert_eq!(duplicate.status, StatusCode::CONFLICT);
    assert_eq!(duplicate.message(), "A BIA timeframe with the name '1 day' already exists.");
}

#[tokio::test]
#[serial]
#[ignore = "requires postgres (TEST_DATABASE_URL or docker)"]
async fn test_impact_criteria_rules() {
    let ctx = TestContext::new().await;
    let tenant = TenantFixture::seed(&ctx).await;
    let app = ctx.app();
    let token = &tenant.admin_token;

    let category = post(&app, "/api/v1/bia-categories", token, json!({ "name": "Operational" })).await.id();

    let unknown_category = post(&app, "/api/v1/bia-impact-criteria", token, criterion_body(Uuid::new_v4(), "Downtime")).await;
    assert_eq!(unknown_category.status, StatusCode::NOT_FOUND);
    assert_eq!(unknown_category.message(), "BIA category not found");

    let mut no_levels = criterion_body(category, "Downtime");
    no_levels["levels"] = json!([]);
    let response = post(&app, "/api/v1/bia-impact-criteria", token, no_levels).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.message(), "At least one impact criterion level is required.");

    let mut inverted = criterion_body(category, "Downtime");
    inverted["rating_type"] = json!("QUANTITATIVE");
    inverted["levels"] = json!([{ "level_value_min": 10.0, "level_value_max": 1.0, "score": 1 }]);
    let response = post(&app, "/api/v1/bia-impact-criteria", token, inverted).await;
    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);

    let created = post(&app, "/api/v1/bia-impact-criteria", token, criterion_body(category, "Downtime")).await;
    assert_eq!(created.status, StatusCode::CREATED, "{}", created.body);
    assert_eq!(created.body["levels"].as_array().unwrap().len(), 2);
    assert_eq!(created.body["levels"][0]["level_name"], "Minor");
    let id = created.id();

    let duplicate = post(&app, "/api/v1/bia-impact-criteria", token, criterion_body(category, "downtime")).await;
    assert_eq!(duplicate.status, StatusCode::CONFLICT);

    let cleared = put(
        &app,
        &format!("/api/v1/bia-impact-criteria/{}", id),
        token,
        json!({ "levels": [] }),
    )
    .await;
    assert_eq!(cleared.status, StatusCode::BAD_REQUEST);

    let renamed = put(
        &app,
        &format!("/api/v1/bia-impact-criteria/{}", id),
        token,
        json!({ "name": "Service downtime" }),
    )
    .await;
    assert_eq!(renamed.status, StatusCode::OK);
    assert_eq!(renamed.body["levels"].as_array().unwrap().len(), 2);

    assert_eq!(
        delete(&app, &format!("/api/v1/bia-impact-criteria/{}", id), token).await.status,
        StatusCode::OK
    );
}

#[tokio::test]
#[serial]
#[ignore = "requires postgres (TEST_DATABASE_URL or docker)"]
async fn test_framework_weightages() {
    let ctx = TestContext::new().await;
    let tenant = TenantFixture::seed(&ctx).await;
    let manager = tenant.user_with_role(&ctx, RoleName::BcmManager).await;
    let app = ctx.app();
    let token = &manager.token;

    let category = post(&app, "/api/v1/bia-categories", token, json!({ "name": "Reputational" })).await.id();
    let media = post(&app, "/api/v1/bia-impact-criteria", token, criterion_body(category, "Media coverage")).await.id();
    let trust = post(&app, "/api/v1/bia-impact-criteria", token, criterion_body(category, "Customer trust")).await.id();

    let unbalanced = post(
        &app,
        "/api/v1/bia-frameworks",
        token,
        json!({
            "name": "Standard",
            "threshold": 3.5,
            "parameters": [
                { "criterion_id": media, "weightage": 60.0 },
                { "criterion_id": trust, "weightage": 30.0 },
            ],
            "rtos": [{ "display_text": "4 hours", "value_in_hours": 4 }],
        }),
    )
    .await;
    assert_eq!(unbalanced.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        unbalanced.body["details"]["parameters"][0],
        "The sum of all parameter weightages must be 100."
    );

    let unknown_criterion = post(
        &app,
        "/api/v1/bia-frameworks",
        token,
        json!({
            "name": "Standard",
            "threshold": 3.5,
            "parameters": [{ "criterion_id": Uuid::new_v4(), "weightage": 100.0 }],
            "rtos": [],
        }),
    )
    .await;
    assert_eq!(unknown_criterion.status, StatusCode::NOT_FOUND);

    let created = post(
        &app,
        "/api/v1/bia-frameworks",
        token,
        json!({
            "name": "Standard",
            "threshold": 3.5,
            "parameters": [
                { "criterion_id": media, "weightage": 33.33 },
                { "criterion_id": trust, "weightage": 66.67 },
            ],
            "rtos": [
                { "display_text": "1 day", "value_in_hours": 24 },
                { "display_text": "4 hours", "value_in_hours": 4 },
            ],
        }),
    )
    .await;
    assert_eq!(created.status, StatusCode::CREATED, "{}", created.body);
    assert_eq!(created.body["formula"], "WEIGHTED_AVERAGE");
    assert_eq!(created.body["parameters"].as_array().unwrap().len(), 2);
    assert_eq!(created.body["rtos"][0]["value_in_hours"], 4);
    let id = created.id();

    // Threshold-only update keeps the parameters
    let updated = put(
        &app,
        &format!("/api/v1/bia-frameworks/{}", id),
        token,
        json!({ "threshold": 4.0 }),
    )
    .await;
    assert_eq!(updated.status, StatusCode::OK);
    assert_eq!(updated.body["threshold"], 4.0);
    assert_eq!(updated.body["parameters"].as_array().unwrap().len(), 2);

    let deleted = delete(&app, &format!("/api/v1/bia-frameworks/{}", id), token).await;
    assert_eq!(deleted.status, StatusCode::OK);
    assert_eq!(deleted.body["is_active"], false);
    assert_eq!(
        get(&app, &format!("/api/v1/bia-frameworks/{}", id), token).await.status,
        StatusCode::NOT_FOUND
    );
}
