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
use crate::services::departments::{CreateDepartment, UpdateDepartment, DepartmentService};
use crate::validation::Validated;
use crate::AppState;
use bcms_shared::DepartmentDetail;

pub fn department_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_departments).post(create_department))
        .route("/:id", get(get_department).put(update_department).delete(delete_department))
}

async fn list_departments(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Query(params): Query<PaginationParams>,
) -> ApiResult<Json<PaginatedResponse<DepartmentDetail>>> {
    user.require_permissions(&[Permission::DepartmentRead])?;
    let page = DepartmentService::new(state.db_pool.clone())
        .list(&user.actor(), &params)
        .await?;
    Ok(Json(page))
}

async fn get_department(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<DepartmentDetail>> {
    user.require_permissions(&[Permission::DepartmentRead])?;
    let department = DepartmentService::new(state.db_pool.clone()).get(&user.actor(), id).await?;
    Ok(Json(department))
}

async fn create_department(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Validated(payload): Validated<CreateDepartment>,
) -> ApiResult<(StatusCode, Json<DepartmentDetail>)> {
    user.require_permissions(&[Permission::DepartmentCreate])?;
    let department = DepartmentService::new(state.db_pool.clone())
        .create(&user.actor(), payload)
        .await?;
    Ok((StatusCode::CREATED, Json(department)))
}

async fn update_department(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
    Validated(payload): Validated<UpdateDepartment>,
) -> ApiResult<Json<DepartmentDetail>> {
    user.require_permissions(&[Permission::DepartmentUpdate])?;
    let department = DepartmentService::new(state.db_pool.clone())
        .update(&user.actor(), id, payload)
        .await?;
    Ok(Json(department))
}

async fn delete_department(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<DepartmentDetail>> {
    user.require_permissions(&[Permission::DepartmentDelete])?;
    let department = DepartmentService::new(state.db_pool.clone()).delete(&user.actor(), id).await?;
    Ok(Json(department))
}
