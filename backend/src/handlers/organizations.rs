use axum::{extract::State, response::Json, routing::get, Router};
use std::sync::Arc;

use crate::auth::{CurrentUser, Permission};
use crate::error::ApiResult;
use crate::services::organizations::{OrganizationService, UpdateOrganization};
use crate::validation::Validated;
use crate::AppState;
use bcms_shared::Organization;

pub fn organization_routes() -> Router<Arc<AppState>> {
    Router::new().route("/me", get(get_my_organization).put(update_my_organization))
}

async fn get_my_organization(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
) -> ApiResult<Json<Organization>> {
    user.require_permissions(&[Permission::OrganizationRead])?;
    let organization = OrganizationService::new(state.db_pool.clone())
        .current(&user.actor())
        .await?;
    Ok(Json(organization))
}

async fn update_my_organization(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Validated(payload): Validated<UpdateOrganization>,
) -> ApiResult<Json<Organization>> {
    user.require_permissions(&[Permission::OrganizationUpdate])?;
    let organization = OrganizationService::new(state.db_pool.clone())
        .update_current(&user.actor(), payload)
        .await?;
    Ok(Json(organization))
}
