//! Frameworks are gated by role membership rather than by permission.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::rbac::{FRAMEWORK_READ_ROLES, FRAMEWORK_WRITE_ROLES};
use crate::auth::CurrentUser;
use crate::error::ApiResult;
use crate::pagination::{PaginatedResponse, PaginationParams};
use crate::services::bia_frameworks::{BiaFrameworkService, CreateFramework, UpdateFramework};
use crate::validation::Validated;
use crate::AppState;
use bcms_shared::BiaFrameworkDetail;

pub fn bia_framework_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_frameworks).post(create_framework))
        .route("/:id", get(get_framework).put(update_framework).delete(delete_framework))
}

async fn list_frameworks(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Query(params): Query<PaginationParams>,
) -> ApiResult<Json<PaginatedResponse<BiaFrameworkDetail>>> {
    user.require_roles(FRAMEWORK_READ_ROLES)?;
    let page = BiaFrameworkService::new(state.db_pool.clone())
        .list(&user.actor(), &params)
        .await?;
    Ok(Json(page))
}

async fn get_framework(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<BiaFrameworkDetail>> {
    user.require_roles(FRAMEWORK_READ_ROLES)?;
    let framework = BiaFrameworkService::new(state.db_pool.clone())
        .get(&user.actor(), id)
        .await?;
    Ok(Json(framework))
}

async fn create_framework(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Validated(payload): Validated<CreateFramework>,
) -> ApiResult<(StatusCode, Json<BiaFrameworkDetail>)> {
    user.require_roles(FRAMEWORK_WRITE_ROLES)?;
    let framework = BiaFrameworkService::new(state.db_pool.clone())
        .create(&user.actor(), payload)
        .await?;
    Ok((StatusCode::CREATED, Json(framework)))
}

async fn update_framework(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
    Validated(payload): Validated<UpdateFramework>,
) -> ApiResult<Json<BiaFrameworkDetail>> {
    user.require_roles(FRAMEWORK_WRITE_ROLES)?;
    let framework = BiaFrameworkService::new(state.db_pool.clone())
        .update(&user.actor(), id, payload)
        .await?;
    Ok(Json(framework))
}

async fn delete_framework(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<BiaFrameworkDetail>> {
    user.require_roles(FRAMEWORK_WRITE_ROLES)?;
    let framework = BiaFrameworkService::new(state.db_pool.clone())
        .delete(&user.actor(), id)
        .await?;
    Ok(Json(framework))
}
