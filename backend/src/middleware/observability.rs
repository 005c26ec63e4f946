use axum::{
    body::Body,
    extract::State,
    http::{HeaderValue, Request, Response, StatusCode},
    middleware::Next,
};
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use crate::AppState;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Logs one line per request and tags the response with a request id
pub async fn request_logging(request: Request<Body>, next: Next) -> Response<Body> {
    let request_id = Uuid::new_v4();
    let started = Instant::now();
    let method = request.method().clone();
    let path = normalize_path(request.uri().path());

    let mut response = next.run(request).await;

    let status = response.status();
    let elapsed_ms = started.elapsed().as_millis() as u64;

    if status.is_server_error() {
        tracing::error!(%request_id, %method, %path, status = status.as_u16(), elapsed_ms, "request failed");
    } else if status.is_client_error() {
        tracing::warn!(%request_id, %method, %path, status = status.as_u16(), elapsed_ms, "request rejected");
    } else {
        tracing::info!(%request_id, %method, %path, status = status.as_u16(), elapsed_ms, "request completed");
    }

    if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

/// Collapse id segments so similar endpoints log under one path
/// (e.g. /api/v1/processes/<uuid> -> /api/v1/processes/:id)
fn normalize_path(path: &str) -> String {
    path.split('/')
        .map(|s| if Uuid::parse_str(s).is_ok() { ":id" } else { s })
        .collect::<Vec<_>>()
        .join("/")
}

/// Health check endpoint with per-dependency status
pub async fn detailed_health_check(
    State(state): State<Arc<AppState>>,
) -> Result<axum::Json<HealthCheckResponse>, StatusCode> {
    let started = Instant::now();

    let db_status = match sqlx::query("SELECT 1").execute(&state.db_pool).await {
        Ok(_) => ServiceStatus {
            status: "healthy".to_string(),
            response_time_ms: Some(started.elapsed().as_millis() as i32),
            details: Some(serde_json::json!(crate::database::pool_stats(&state.db_pool))),
        },
        Err(e) => ServiceStatus {
            status: "unhealthy".to_string(),
            response_time_ms: Some(started.elapsed().as_millis() as i32),
            details: Some(serde_json::json!({ "error": e.to_string() })),
        },
    };

    if db_status.status != "healthy" {
        tracing::warn!(details = ?db_status.details, "database health check failed");
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    }

    Ok(axum::Json(HealthCheckResponse {
        status: "healthy".to_string(),
        timestamp: Utc::now(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        services: [("database".to_string(), db_status)].into_iter().collect(),
    }))
}

#[derive(Debug, serde::Serialize)]
pub struct HealthCheckResponse {
    pub status: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub version: String,
    pub services: std::collections::HashMap<String, ServiceStatus>,
}

#[derive(Debug, serde::Serialize)]
pub struct ServiceStatus {
    pub status: String,
    pub response_time_ms: Option<i32>,
    pub details: Option<serde_json::Value>,
}
