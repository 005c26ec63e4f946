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
use crate::services::roles::{CreateRole, RoleService, UpdateRole};
use crate::validation::Validated;
use crate::AppState;
use bcms_shared::{Permission as PermissionRecord, RoleWithPermissions};

pub fn role_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_roles).post(create_role))
        .route("/permissions", get(list_permissions))
        .route("/:id", get(get_role).put(update_role).delete(delete_role))
}

async fn list_permissions(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
) -> ApiResult<Json<Vec<PermissionRecord>>> {
    user.require_permissions(&[Permission::PermissionRead])?;
    let permissions = RoleService::new(state.db_pool.clone()).list_permissions().await?;
    Ok(Json(permissions))
}

async fn list_roles(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Query(params): Query<PaginationParams>,
) -> ApiResult<Json<PaginatedResponse<RoleWithPermissions>>> {
    user.require_permissions(&[Permission::RoleRead])?;
    let page = RoleService::new(state.db_pool.clone())
        .list(&user.actor(), &params)
        .await?;
    Ok(Json(page))
}

async fn get_role(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<RoleWithPermissions>> {
    user.require_permissions(&[Permission::RoleRead])?;
    let role = RoleService::new(state.db_pool.clone()).get(&user.actor(), id).await?;
    Ok(Json(role))
}

async fn create_role(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Validated(payload): Validated<CreateRole>,
) -> ApiResult<(StatusCode, Json<RoleWithPermissions>)> {
    user.require_permissions(&[Permission::RoleCreate])?;
    let role = RoleService::new(state.db_pool.clone())
        .create(&user.actor(), payload)
        .await?;
    Ok((StatusCode::CREATED, Json(role)))
}

async fn update_role(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
    Validated(payload): Validated<UpdateRole>,
) -> ApiResult<Json<RoleWithPermissions>> {
    user.require_permissions(&[Permission::RoleUpdate])?;
    let role = RoleService::new(state.db_pool.clone())
        .update(&user.actor(), id, payload)
        .await?;
    Ok(Json(role))
}

async fn delete_role(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<RoleWithPermissions>> {
    user.require_permissions(&[Permission::RoleDelete])?;
    let role = RoleService::new(state.db_pool.clone()).delete(&user.actor(), id).await?;
    Ok(Json(role))
}
