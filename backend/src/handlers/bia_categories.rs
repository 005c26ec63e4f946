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
use crate::services::bia_categories::{CreateBiaCategory, UpdateBiaCategory, BiaCategoryService};
use crate::validation::Validated;
use crate::AppState;
use bcms_shared::{Audited, BiaCategory};

pub fn bia_category_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_categories).post(create_category))
        .route("/:id", get(get_category).put(update_category).delete(delete_category))
}

async fn list_categories(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Query(params): Query<PaginationParams>,
) -> ApiResult<Json<PaginatedResponse<Audited<BiaCategory>>>> {
    user.require_permissions(&[Permission::BiaCategoryRead])?;
    let page = BiaCategoryService::new(state.db_pool.clone())
        .list(&user.actor(), &params)
        .await?;
    Ok(Json(page))
}

async fn get_category(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Audited<BiaCategory>>> {
    user.require_permissions(&[Permission::BiaCategoryRead])?;
    let category = BiaCategoryService::new(state.db_pool.clone()).get(&user.actor(), id).await?;
    Ok(Json(category))
}

async fn create_category(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Validated(payload): Validated<CreateBiaCategory>,
) -> ApiResult<(StatusCode, Json<Audited<BiaCategory>>)> {
    user.require_permissions(&[Permission::BiaCategoryCreate])?;
    let category = BiaCategoryService::new(state.db_pool.clone())
        .create(&user.actor(), payload)
        .await?;
    Ok((StatusCode::CREATED, Json(category)))
}

async fn update_category(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
    Validated(payload): Validated<UpdateBiaCategory>,
) -> ApiResult<Json<Audited<BiaCategory>>> {
    user.require_permissions(&[Permission::BiaCategoryUpdate])?;
    let category = BiaCategoryService::new(state.db_pool.clone())
        .update(&user.actor(), id, payload)
        .await?;
    Ok(Json(category))
}

async fn delete_category(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Audited<BiaCategory>>> {
    user.require_permissions(&[Permission::BiaCategoryDelete])?;
    let category = BiaCategoryService::new(state.db_pool.clone()).delete(&user.actor(), id).await?;
    Ok(Json(category))
}
