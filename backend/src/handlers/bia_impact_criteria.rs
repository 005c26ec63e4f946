use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::{CurrentUser, Permission};
use crate::error::ApiResult;
use crate::pagination::{PaginatedResponse, PaginationParams};
use crate::services::bia_impact_criteria::{CreateImpactCriterion, UpdateImpactCriterion, BiaImpactCriterionService};
use crate::validation::Validated;
use crate::AppState;
use bcms_shared::BiaImpactCriterionDetail;

pub fn bia_impact_criterion_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_criteria).post(create_criterion))
        .route("/:id", get(get_criterion).put(update_criterion).delete(delete_criterion))
}

async fn list_criteria(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Query(params): Query<PaginationParams>,
) -> ApiResult<Json<PaginatedResponse<BiaImpactCriterionDetail>>> {
    user.require_permissions(&[Permission::BiaImpactCriterionRead])?;
    let page = BiaImpactCriterionService::new(state.db_pool.clone())
        .list(&user.actor(), &params)
        .await?;
    Ok(Json(page))
}

async fn get_criterion(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<BiaImpactCriterionDetail>> {
    user.require_permissions(&[Permission::BiaImpactCriterionRead])?;
    let criterion = BiaImpactCriterionService::new(state.db_pool.clone()).get(&user.actor(), id).await?;
    Ok(Json(criterion))
}

async fn create_criterion(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Validated(payload): Validated<CreateImpactCriterion>,
) -> ApiResult<(StatusCode, Json<BiaImpactCriterionDetail>)> {
    user.require_permissions(&[Permission::BiaImpactCriterionCreate])?;
    let criterion = BiaImpactCriterionService::new(state.db_pool.clone())
        .create(&user.actor(), payload)
        .await?;
    Ok((StatusCode::CREATED, Json(criterion)))
}

async fn update_criterion(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
    Validated(payload): Validated<UpdateImpactCriterion>,
) -> ApiResult<Json<BiaImpactCriterionDetail>> {
    user.require_permissions(&[Permission::BiaImpactCriterionUpdate])?;
    let criterion = BiaImpactCriterionService::new(state.db_pool.clone())
        .update(&user.actor(), id, payload)
        .await?;
    Ok(Json(criterion))
}

async fn delete_criterion(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<BiaImpactCriterionDetail>> {
    user.require_permissions(&[Permission::BiaImpactCriterionDelete])?;
    let criterion = BiaImpactCriterionService::new(state.db_pool.clone()).delete(&user.actor(), id).await?;
    Ok(Json(criterion))
}
