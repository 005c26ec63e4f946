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
use crate::services::applications::{CreateApplication, UpdateApplication, ApplicationService};
use crate::validation::Validated;
use crate::AppState;
use bcms_shared::Application;

pub fn application_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_applications).post(create_application))
        .route("/:id", get(get_application).put(update_application).delete(delete_application))
}

async fn list_applications(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Query(params): Query<PaginationParams>,
) -> ApiResult<Json<PaginatedResponse<Application>>> {
    user.require_permissions(&[Permission::ApplicationRead])?;
    let page = ApplicationService::new(state.db_pool.clone())
        .list(&user.actor(), &params)
        .await?;
    Ok(Json(page))
}

async fn get_application(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Application>> {
    user.require_permissions(&[Permission::ApplicationRead])?;
    let application = ApplicationService::new(state.db_pool.clone()).get(&user.actor(), id).await?;
    Ok(Json(application))
}

async fn create_application(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Validated(payload): Validated<CreateApplication>,
) -> ApiResult<(StatusCode, Json<Application>)> {
    user.require_permissions(&[Permission::ApplicationCreate])?;
    let application = ApplicationService::new(state.db_pool.clone())
        .create(&user.actor(), payload)
        .await?;
    Ok((StatusCode::CREATED, Json(application)))
}

async fn update_application(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
    Validated(payload): Validated<UpdateApplication>,
) -> ApiResult<Json<Application>> {
    user.require_permissions(&[Permission::ApplicationUpdate])?;
    let application = ApplicationService::new(state.db_pool.clone())
        .update(&user.actor(), id, payload)
        .await?;
    Ok(Json(application))
}

async fn delete_application(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Application>> {
    user.require_permissions(&[Permission::ApplicationDelete])?;
    let application = ApplicationService::new(state.db_pool.clone()).delete(&user.actor(), id).await?;
    Ok(Json(application))
}
