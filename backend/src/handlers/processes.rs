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
use crate::services::processes::{CreateProcess, UpdateProcess, ProcessService};
use crate::validation::Validated;
use crate::AppState;
use bcms_shared::ProcessDetail;

pub fn process_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_processes).post(create_process))
        .route("/:id", get(get_process).put(update_process).delete(delete_process))
}

async fn list_processes(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Query(params): Query<PaginationParams>,
) -> ApiResult<Json<PaginatedResponse<ProcessDetail>>> {
    user.require_permissions(&[Permission::ProcessRead])?;
    let page = ProcessService::new(state.db_pool.clone())
        .list(&user.actor(), &params)
        .await?;
    Ok(Json(page))
}

async fn get_process(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ProcessDetail>> {
    user.require_permissions(&[Permission::ProcessRead])?;
    let process = ProcessService::new(state.db_pool.clone()).get(&user.actor(), id).await?;
    Ok(Json(process))
}

async fn create_process(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Validated(payload): Validated<CreateProcess>,
) -> ApiResult<(StatusCode, Json<ProcessDetail>)> {
    user.require_permissions(&[Permission::ProcessCreate])?;
    let process = ProcessService::new(state.db_pool.clone())
        .create(&user.actor(), payload)
        .await?;
    Ok((StatusCode::CREATED, Json(process)))
}

async fn update_process(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
    Validated(payload): Validated<UpdateProcess>,
) -> ApiResult<Json<ProcessDetail>> {
    user.require_permissions(&[Permission::ProcessUpdate])?;
    let process = ProcessService::new(state.db_pool.clone())
        .update(&user.actor(), id, payload)
        .await?;
    Ok(Json(process))
}

async fn delete_process(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ProcessDetail>> {
    user.require_permissions(&[Permission::ProcessDelete])?;
    let process = ProcessService::new(state.db_pool.clone()).delete(&user.actor(), id).await?;
    Ok(Json(process))
}
