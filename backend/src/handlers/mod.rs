use axum::{extract::State, http::StatusCode, response::Json};
use serde_json::json;
use std::sync::Arc;

use crate::AppState;

pub mod applications;
pub mod bia_categories;
pub mod bia_frameworks;
pub mod bia_impact_criteria;
pub mod bia_parameters;
pub mod departments;
pub mod locations;
pub mod organizations;
pub mod processes;
pub mod roles;
pub mod users;
pub mod vendors;

pub use applications::application_routes;
pub use bia_categories::bia_category_routes;
pub use bia_frameworks::bia_framework_routes;
pub use bia_impact_criteria::bia_impact_criterion_routes;
pub use bia_parameters::{impact_scale_routes, timeframe_routes};
pub use departments::department_routes;
pub use locations::location_routes;
pub use organizations::organization_routes;
pub use processes::process_routes;
pub use roles::role_routes;
pub use users::user_routes;
pub use vendors::vendor_routes;

pub async fn health_check(State(state): State<Arc<AppState>>) -> (StatusCode, Json<serde_json::Value>) {
    if crate::database::health_check(&state.db_pool).await {
        (StatusCode::OK, Json(json!({"status": "healthy", "service": "bcms-api"})))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"status": "unhealthy", "service": "bcms-api"})),
        )
    }
}
