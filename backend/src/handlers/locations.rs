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
use crate::services::locations::{CreateLocation, UpdateLocation, LocationService};
use crate::validation::Validated;
use crate::AppState;
use bcms_shared::Location;

pub fn location_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_locations).post(create_location))
        .route("/:id", get(get_location).put(update_location).delete(delete_location))
}

async fn list_locations(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Query(params): Query<PaginationParams>,
) -> ApiResult<Json<PaginatedResponse<Location>>> {
    user.require_permissions(&[Permission::LocationRead])?;
    let page = LocationService::new(state.db_pool.clone())
        .list(&user.actor(), &params)
        .await?;
    Ok(Json(page))
}

async fn get_location(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Location>> {
    user.require_permissions(&[Permission::LocationRead])?;
    let location = LocationService::new(state.db_pool.clone()).get(&user.actor(), id).await?;
    Ok(Json(location))
}

async fn create_location(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Validated(payload): Validated<CreateLocation>,
) -> ApiResult<(StatusCode, Json<Location>)> {
    user.require_permissions(&[Permission::LocationCreate])?;
    let location = LocationService::new(state.db_pool.clone())
        .create(&user.actor(), payload)
        .await?;
    Ok((StatusCode::CREATED, Json(location)))
}

async fn update_location(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
    Validated(payload): Validated<UpdateLocation>,
) -> ApiResult<Json<Location>> {
    user.require_permissions(&[Permission::LocationUpdate])?;
    let location = LocationService::new(state.db_pool.clone())
        .update(&user.actor(), id, payload)
        .await?;
    Ok(Json(location))
}

async fn delete_location(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Location>> {
    user.require_permissions(&[Permission::LocationDelete])?;
    let location = LocationService::new(state.db_pool.clone()).delete(&user.actor(), id).await?;
    Ok(Json(location))
}
