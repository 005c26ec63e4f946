use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
    response::{IntoResponse, Response},
};
use std::collections::HashSet;
use std::sync::Arc;

use super::jwt;
use super::rbac::{self, Permission, RoleName};
use crate::error::{ApiResult, AppError};
use crate::services::Actor;
use crate::AppState;
use bcms_shared::{Role, User};

/// Authenticated user with roles and the union of their permissions loaded
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub user: User,
    pub roles: Vec<Role>,
    pub permissions: HashSet<String>,
}

fn unauthorized(message: &str) -> Response {
    AppError::Unauthorized(message.to_string()).into_response()
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for CurrentUser {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        // Extract Bearer token from Authorization header
        let auth_header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|header| header.to_str().ok())
            .ok_or_else(|| unauthorized("Not authenticated"))?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .or_else(|| auth_header.strip_prefix("bearer "))
            .ok_or_else(|| unauthorized("Invalid authorization format"))?;

        let claims = jwt::decode_access_token(token, &state.config.auth)
            .map_err(|e| AppError::from(e).into_response())?;

        // The user must belong to the tenant named in the token
        let user = sqlx::query_as::<_, User>(
            "SELECT * FROM users WHERE id = $1 AND organization_id = $2",
        )
        .bind(claims.sub)
        .bind(claims.org_id)
        .fetch_optional(&state.db_pool)
        .await
        .map_err(|e| AppError::from(e).into_response())?
        .ok_or_else(|| unauthorized("Could not validate credentials"))?;

        if !user.is_active {
            return Err(unauthorized("Inactive user"));
        }

        let roles = sqlx::query_as::<_, Role>(
            r#"
            SELECT r.*
            FROM roles r
            JOIN user_roles ur ON ur.role_id = r.id
            WHERE ur.user_id = $1
            ORDER BY r.name
            "#,
        )
        .bind(user.id)
        .fetch_all(&state.db_pool)
        .await
        .map_err(|e| AppError::from(e).into_response())?;

        let permissions: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT DISTINCT p.name
            FROM permissions p
            JOIN role_permissions rp ON rp.permission_id = p.id
            JOIN user_roles ur ON ur.role_id = rp.role_id
            WHERE ur.user_id = $1
            "#,
        )
        .bind(user.id)
        .fetch_all(&state.db_pool)
        .await
        .map_err(|e| AppError::from(e).into_response())?;

        Ok(CurrentUser {
            user,
            roles,
            permissions: permissions.into_iter().collect(),
        })
    }
}

impl CurrentUser {
    pub fn organization_id(&self) -> uuid::Uuid {
        self.user.organization_id
    }

    /// Tenant and user id passed down to services
    pub fn actor(&self) -> Actor {
        Actor {
            user_id: self.user.id,
            organization_id: self.user.organization_id,
        }
    }

    pub fn has_permission(&self, permission: Permission) -> bool {
        self.permissions.contains(permission.as_str())
    }

    /// Require every listed permission, returning an error if any is absent
    pub fn require_permissions(&self, required: &[Permission]) -> ApiResult<()> {
        rbac::ensure_user_has_permissions(self, required)
    }

    /// Require any one of the listed roles
    pub fn require_roles(&self, allowed: &[RoleName]) -> ApiResult<()> {
        rbac::ensure_user_has_roles(self, allowed)
    }

    pub fn role_names(&self) -> Vec<String> {
        self.roles.iter().map(|r| r.name.clone()).collect()
    }
}
