pub mod jwt;
pub mod middleware;
pub mod rbac;

use argon2::{
    password_hash::{rand_core::OsRng, SaltString},
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
};
use axum::{
    extract::State,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{ApiResult, AppError};
use crate::validation::{Validate, Validated, ValidationResult, Validator};
use crate::AppState;
use bcms_shared::User;

pub use middleware::CurrentUser;
pub use rbac::{Permission, RoleName};

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    /// Tenant to sign in to; the default organization when omitted
    #[serde(default, alias = "organizationId")]
    pub organization_id: Option<Uuid>,
}

impl Validate for LoginRequest {
    fn validate(&self) -> ValidationResult<()> {
        Validator::new()
            .name(&self.email, "email", 255)
            .error_if(self.password.is_empty(), "password", "password cannot be empty")
            .finish()
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    #[serde(flatten)]
    pub user: User,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
}

pub fn auth_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/login", post(login))
        .route("/me", get(me))
}

async fn login(
    State(state): State<Arc<AppState>>,
    Validated(req): Validated<LoginRequest>,
) -> ApiResult<Json<TokenResponse>> {
    let organization_id = req
        .organization_id
        .unwrap_or(state.config.seed.default_organization_id);

    let user = sqlx::query_as::<_, User>(
        "SELECT * FROM users WHERE organization_id = $1 AND LOWER(email) = LOWER($2)",
    )
    .bind(organization_id)
    .bind(req.email.trim())
    .fetch_optional(&state.db_pool)
    .await?;

    let user = match user {
        Some(u) if u.is_active && verify_password(&req.password, &u.password_hash) => u,
        _ => {
            tracing::info!(%organization_id, "rejected login attempt");
            return Err(AppError::InvalidCredentials);
        }
    };

    let issued = jwt::create_access_token(user.id, user.organization_id, &state.config.auth)
        .map_err(|e| AppError::InternalError(format!("Failed to sign token: {}", e)))?;

    tracing::info!(user_id = %user.id, %organization_id, "user logged in");

    Ok(Json(TokenResponse {
        access_token: issued.token,
        token_type: "bearer".to_string(),
        expires_at: issued.expires_at,
    }))
}

async fn me(current: CurrentUser) -> Json<MeResponse> {
    let roles = current.role_names();
    let mut permissions: Vec<String> = current.permissions.into_iter().collect();
    permissions.sort();

    Json(MeResponse {
        user: current.user,
        roles,
        permissions,
    })
}

pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default().hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// An unparsable stored hash never verifies
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    match PasswordHash::new(stored_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}
