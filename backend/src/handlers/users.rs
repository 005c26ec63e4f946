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
use crate::services::users::{CreateUser, UpdateUser, UserService};
use crate::validation::Validated;
use crate::AppState;
use bcms_shared::UserWithRoles;

pub fn user_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_users).post(create_account))
        .route("/:id", get(get_account).put(update_account).delete(delete_account))
}

async fn list_users(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Query(params): Query<PaginationParams>,
) -> ApiResult<Json<PaginatedResponse<UserWithRoles>>> {
    user.require_permissions(&[Permission::UserRead])?;
    let page = UserService::new(state.db_pool.clone())
        .list(&user.actor(), &params)
        .await?;
    Ok(Json(page))
}

async fn get_account(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<UserWithRoles>> {
    user.require_permissions(&[Permission::UserRead])?;
    let account = UserService::new(state.db_pool.clone()).get(&user.actor(), id).await?;
    Ok(Json(account))
}

async fn create_account(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Validated(payload): Validated<CreateUser>,
) -> ApiResult<(StatusCode, Json<UserWithRoles>)> {
    user.require_permissions(&[Permission::UserCreate])?;
    let account = UserService::new(state.db_pool.clone())
        .create(&user.actor(), payload)
        .await?;
    Ok((StatusCode::CREATED, Json(account)))
}

async fn update_account(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
    Validated(payload): Validated<UpdateUser>,
) -> ApiResult<Json<UserWithRoles>> {
    user.require_permissions(&[Permission::UserUpdate])?;
    let account = UserService::new(state.db_pool.clone())
        .update(&user.actor(), id, payload)
        .await?;
    Ok(Json(account))
}

async fn delete_account(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<UserWithRoles>> {
    user.require_permissions(&[Permission::UserDelete])?;
    let account = UserService::new(state.db_pool.clone()).delete(&user.actor(), id).await?;
    Ok(Json(account))
}
