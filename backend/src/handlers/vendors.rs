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
use crate::services::vendors::{CreateVendor, UpdateVendor, VendorService};
use crate::validation::Validated;
use crate::AppState;
use bcms_shared::Vendor;

pub fn vendor_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_vendors).post(create_vendor))
        .route("/:id", get(get_vendor).put(update_vendor).delete(delete_vendor))
}

async fn list_vendors(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Query(params): Query<PaginationParams>,
) -> ApiResult<Json<PaginatedResponse<Vendor>>> {
    user.require_permissions(&[Permission::VendorRead])?;
    let page = VendorService::new(state.db_pool.clone())
        .list(&user.actor(), &params)
        .await?;
    Ok(Json(page))
}

async fn get_vendor(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vendor>> {
    user.require_permissions(&[Permission::VendorRead])?;
    let vendor = VendorService::new(state.db_pool.clone()).get(&user.actor(), id).await?;
    Ok(Json(vendor))
}

async fn create_vendor(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Validated(payload): Validated<CreateVendor>,
) -> ApiResult<(StatusCode, Json<Vendor>)> {
    user.require_permissions(&[Permission::VendorCreate])?;
    let vendor = VendorService::new(state.db_pool.clone())
        .create(&user.actor(), payload)
        .await?;
    Ok((StatusCode::CREATED, Json(vendor)))
}

async fn update_vendor(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
    Validated(payload): Validated<UpdateVendor>,
) -> ApiResult<Json<Vendor>> {
    user.require_permissions(&[Permission::VendorUpdate])?;
    let vendor = VendorService::new(state.db_pool.clone())
        .update(&user.actor(), id, payload)
        .await?;
    Ok(Json(vendor))
}

async fn delete_vendor(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vendor>> {
    user.require_permissions(&[Permission::VendorDelete])?;
    let vendor = VendorService::new(state.db_pool.clone()).delete(&user.actor(), id).await?;
    Ok(Json(vendor))
}
