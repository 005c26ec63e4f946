//! Impact scales and timeframes, both guarded by the `bia_parameter` permissions

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
use crate::services::bia_impact_scales::{BiaImpactScaleService, CreateImpactScale, UpdateImpactScale};
use crate::services::bia_timeframes::{BiaTimeframeService, CreateTimeframe, UpdateTimeframe};
use crate::validation::Validated;
use crate::AppState;
use bcms_shared::{Audited, BiaImpactScaleDetail, BiaTimeframe};

pub fn impact_scale_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_impact_scales).post(create_impact_scale))
        .route(
            "/:id",
            get(get_impact_scale).put(update_impact_scale).delete(delete_impact_scale),
        )
}

pub fn timeframe_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_timeframes).post(create_timeframe))
        .route("/:id", get(get_timeframe).put(update_timeframe).delete(delete_timeframe))
}

async fn list_impact_scales(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Query(params): Query<PaginationParams>,
) -> ApiResult<Json<PaginatedResponse<BiaImpactScaleDetail>>> {
    user.require_permissions(&[Permission::BiaParameterRead])?;
    let page = BiaImpactScaleService::new(state.db_pool.clone())
        .list(&user.actor(), &params)
        .await?;
    Ok(Json(page))
}

async fn get_impact_scale(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<BiaImpactScaleDetail>> {
    user.require_permissions(&[Permission::BiaParameterRead])?;
    let scale = BiaImpactScaleService::new(state.db_pool.clone())
        .get(&user.actor(), id)
        .await?;
    Ok(Json(scale))
}

async fn create_impact_scale(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Validated(payload): Validated<CreateImpactScale>,
) -> ApiResult<(StatusCode, Json<BiaImpactScaleDetail>)> {
    user.require_permissions(&[Permission::BiaParameterCreate])?;
    let scale = BiaImpactScaleService::new(state.db_pool.clone())
        .create(&user.actor(), payload)
        .await?;
    Ok((StatusCode::CREATED, Json(scale)))
}

async fn update_impact_scale(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
    Validated(payload): Validated<UpdateImpactScale>,
) -> ApiResult<Json<BiaImpactScaleDetail>> {
    user.require_permissions(&[Permission::BiaParameterUpdate])?;
    let scale = BiaImpactScaleService::new(state.db_pool.clone())
        .update(&user.actor(), id, payload)
        .await?;
    Ok(Json(scale))
}

async fn delete_impact_scale(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<BiaImpactScaleDetail>> {
    user.require_permissions(&[Permission::BiaParameterDelete])?;
    let scale = BiaImpactScaleService::new(state.db_pool.clone())
        .delete(&user.actor(), id)
        .await?;
    Ok(Json(scale))
}

async fn list_timeframes(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Query(params): Query<PaginationParams>,
) -> ApiResult<Json<PaginatedResponse<Audited<BiaTimeframe>>>> {
    user.require_permissions(&[Permission::BiaParameterRead])?;
    let page = BiaTimeframeService::new(state.db_pool.clone())
        .list(&user.actor(), &params)
        .await?;
    Ok(Json(page))
}

async fn get_timeframe(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Audited<BiaTimeframe>>> {
    user.require_permissions(&[Permission::BiaParameterRead])?;
    let timeframe = BiaTimeframeService::new(state.db_pool.clone())
        .get(&user.actor(), id)
        .await?;
    Ok(Json(timeframe))
}

async fn create_timeframe(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Validated(payload): Validated<CreateTimeframe>,
) -> ApiResult<(StatusCode, Json<Audited<BiaTimeframe>>)> {
    user.require_permissions(&[Permission::BiaParameterCreate])?;
    let timeframe = BiaTimeframeService::new(state.db_pool.clone())
        .create(&user.actor(), payload)
        .await?;
    Ok((StatusCode::CREATED, Json(timeframe)))
}

async fn update_timeframe(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
    Validated(payload): Validated<UpdateTimeframe>,
) -> ApiResult<Json<Audited<BiaTimeframe>>> {
    user.require_permissions(&[Permission::BiaParameterUpdate])?;
    let timeframe = BiaTimeframeService::new(state.db_pool.clone())
        .update(&user.actor(), id, payload)
        .await?;
    Ok(Json(timeframe))
}

async fn delete_timeframe(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Audited<BiaTimeframe>>> {
    user.require_permissions(&[Permission::BiaParameterDelete])?;
    let timeframe = BiaTimeframeService::new(state.db_pool.clone())
        .delete(&user.actor(), id)
        .await?;
    Ok(Json(timeframe))
}
