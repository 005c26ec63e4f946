use serde::Deserialize;
use sqlx::{FromRow, PgPool};
use std::collections::HashMap;
use uuid::Uuid;

use super::{
    all_exist_in_organization, fetch_page, patch, patch_nullable, replace_links, Actor,
    ServiceError, ServiceResult,
};
use crate::auth::hash_password;
use crate::pagination::{PaginatedResponse, PaginationParams};
use crate::validation::{nullable, patched, Validate, ValidationResult, Validator};
use bcms_shared::{Role, User, UserWithRoles};

pub const SORT_FIELDS: &[&str] = &["last_name", "first_name", "email", "created_at", "updated_at"];

const DUPLICATE_EMAIL: &str = "A user with this email already exists in this organization.";
const UNKNOWN_ROLES: &str = "One or more role IDs are invalid or do not belong to this organization.";
const MIN_PASSWORD_LENGTH: usize = 8;

#[derive(Debug, Clone, Deserialize)]
pub struct CreateUser {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
    pub job_title: Option<String>,
    pub department_id: Option<Uuid>,
    pub location_id: Option<Uuid>,
    #[serde(default)]
    pub role_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateUser {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub job_title: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub department_id: Option<Option<Uuid>>,
    #[serde(default, deserialize_with = "nullable")]
    pub location_id: Option<Option<Uuid>>,
    pub role_ids: Option<Vec<Uuid>>,
}

impl Validate for CreateUser {
    fn validate(&self) -> ValidationResult<()> {
        Validator::new()
            .name(&self.first_name, "first_name", 100)
            .name(&self.last_name, "last_name", 100)
            .name(&self.email, "email", 255)
            .email(Some(&self.email), "email")
            .min_length(Some(&self.password), "password", MIN_PASSWORD_LENGTH)
            .max_length(self.job_title.as_deref(), "job_title", 255)
            .finish()
    }
}

impl Validate for UpdateUser {
    fn validate(&self) -> ValidationResult<()> {
        Validator::new()
            .optional_name(self.first_name.as_deref(), "first_name", 100)
            .optional_name(self.last_name.as_deref(), "last_name", 100)
            .email(self.email.as_deref(), "email")
            .min_length(self.password.as_deref(), "password", MIN_PASSWORD_LENGTH)
            .max_length(patched(&self.job_title), "job_title", 255)
            .finish()
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[derive(FromRow)]
struct AssignedRole {
    user_id: Uuid,
    #[sqlx(flatten)]
    role: Role,
}

pub struct UserService {
    pool: PgPool,
}

impl UserService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn roles_for(&self, user_ids: &[Uuid]) -> ServiceResult<HashMap<Uuid, Vec<Role>>> {
        let rows = sqlx::query_as::<_, AssignedRole>(
            r#"
            SELECT ur.user_id, r.*
            FROM roles r
            JOIN user_roles ur ON ur.role_id = r.id
            WHERE ur.user_id = ANY($1)
            ORDER BY r.name
            "#,
        )
        .bind(user_ids)
        .fetch_all(&self.pool)
        .await?;

        let mut grouped: HashMap<Uuid, Vec<Role>> = HashMap::new();
        for row in rows {
            grouped.entry(row.user_id).or_default().push(row.role);
        }
        Ok(grouped)
    }

    async fn with_roles(&self, user: User) -> ServiceResult<UserWithRoles> {
        let mut grouped = self.roles_for(&[user.id]).await?;
        Ok(UserWithRoles {
            roles: grouped.remove(&user.id).unwrap_or_default(),
            user,
        })
    }

    pub async fn list(
        &self,
        actor: &Actor,
        params: &PaginationParams,
    ) -> ServiceResult<PaginatedResponse<UserWithRoles>> {
        let page = fetch_page::<User>(
            &self.pool,
            "users",
            "is_active",
            actor.organization_id,
            params,
            SORT_FIELDS,
            "last_name",
        )
        .await?;

        let ids: Vec<Uuid> = page.data.iter().map(|u| u.id).collect();
        let mut grouped = self.roles_for(&ids).await?;

        Ok(page.map(|user| UserWithRoles {
            roles: grouped.remove(&user.id).unwrap_or_default(),
            user,
        }))
    }

    async fn find_active(&self, actor: &Actor, id: Uuid) -> ServiceResult<User> {
        sqlx::query_as::<_, User>(
            "SELECT * FROM users WHERE id = $1 AND organization_id = $2 AND is_active",
        )
        .bind(id)
        .bind(actor.organization_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| ServiceError::NotFound("User".to_string()))
    }

    pub async fn get(&self, actor: &Actor, id: Uuid) -> ServiceResult<UserWithRoles> {
        let user = self.find_active(actor, id).await?;
        self.with_roles(user).await
    }

    async fn email_taken(&self, actor: &Actor, email: &str, except: Option<Uuid>) -> ServiceResult<bool> {
        let taken: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM users
                WHERE organization_id = $1 AND LOWER(email) = $2
                  AND ($3::uuid IS NULL OR id <> $3)
            )
            "#,
        )
        .bind(actor.organization_id)
        .bind(email)
        .bind(except)
        .fetch_one(&self.pool)
        .await?;
        Ok(taken)
    }

    async fn check_references(
        &self,
        actor: &Actor,
        department_id: Option<Uuid>,
        location_id: Option<Uuid>,
        role_ids: Option<&[Uuid]>,
    ) -> ServiceResult<()> {
        if let Some(department_id) = department_id {
            if !all_exist_in_organization(&self.pool, "departments", "NOT is_deleted", &[department_id], actor.organization_id)
                .await?
            {
                return Err(ServiceError::Unprocessable(format!(
                    "Department with ID {} not found in this organization.",
                    department_id
                )));
            }
        }
        if let Some(location_id) = location_id {
            if !all_exist_in_organization(&self.pool, "locations", "is_active", &[location_id], actor.organization_id)
                .await?
            {
                return Err(ServiceError::Unprocessable(format!(
                    "Location with ID {} not found in this organization.",
                    location_id
                )));
            }
        }
        if let Some(role_ids) = role_ids {
            if !all_exist_in_organization(&self.pool, "roles", "TRUE", role_ids, actor.organization_id).await? {
                return Err(ServiceError::Unprocessable(UNKNOWN_ROLES.to_string()));
            }
        }
        Ok(())
    }

    pub async fn create(&self, actor: &Actor, input: CreateUser) -> ServiceResult<UserWithRoles> {
        let email = normalize_email(&input.email);
        if self.email_taken(actor, &email, None).await? {
            return Err(ServiceError::Conflict(DUPLICATE_EMAIL.to_string()).into());
        }
        self.check_references(actor, input.department_id, input.location_id, Some(&input.role_ids))
            .await?;

        let password_hash = hash_password(&input.password)?;

        let mut tx = self.pool.begin().await.map_err(ServiceError::from)?;

        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (
                id, organization_id, first_name, last_name, email, password_hash,
                job_title, department_id, location_id, is_active, created_by_id, updated_by_id
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, TRUE, $10, $10)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(actor.organization_id)
        .bind(input.first_name.trim())
        .bind(input.last_name.trim())
        .bind(&email)
        .bind(&password_hash)
        .bind(&input.job_title)
        .bind(input.department_id)
        .bind(input.location_id)
        .bind(actor.user_id)
        .fetch_one(&mut *tx)
        .await?;

        replace_links(&mut tx, "user_roles", "user_id", user.id, "role_id", &input.role_ids).await?;
        tx.commit().await?;

        tracing::info!(user_id = %user.id, organization_id = %actor.organization_id, "user created");
        Ok(self.with_roles(user).await?)
    }

    pub async fn update(&self, actor: &Actor, id: Uuid, input: UpdateUser) -> ServiceResult<UserWithRoles> {
        let mut user = self.find_active(actor, id).await?;

        let email = input.email.as_deref().map(normalize_email);
        if let Some(email) = &email {
            if *email != user.email && self.email_taken(actor, email, Some(id)).await? {
                return Err(ServiceError::Conflict(DUPLICATE_EMAIL.to_string()).into());
            }
        }
        self.check_references(
            actor,
            input.department_id.flatten(),
            input.location_id.flatten(),
            input.role_ids.as_deref(),
        )
        .await?;

        if let Some(password) = input.password.as_deref().filter(|p| !p.is_empty()) {
            user.password_hash = hash_password(password)?;
        }
        patch(&mut user.first_name, input.first_name.map(|n| n.trim().to_string()));
        patch(&mut user.last_name, input.last_name.map(|n| n.trim().to_string()));
        patch(&mut user.email, email);
        patch_nullable(&mut user.job_title, input.job_title);
        patch_nullable(&mut user.department_id, input.department_id);
        patch_nullable(&mut user.location_id, input.location_id);

        let mut tx = self.pool.begin().await.map_err(ServiceError::from)?;

        let user = sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET first_name = $2, last_name = $3, email = $4, password_hash = $5,
                job_title = $6, department_id = $7, location_id = $8,
                updated_by_id = $9, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.job_title)
        .bind(user.department_id)
        .bind(user.location_id)
        .bind(actor.user_id)
        .fetch_one(&mut *tx)
        .await?;

        if let Some(role_ids) = &input.role_ids {
            replace_links(&mut tx, "user_roles", "user_id", id, "role_id", role_ids).await?;
        }
        tx.commit().await?;

        tracing::info!(user_id = %id, "user updated");
        Ok(self.with_roles(user).await?)
    }

    /// Deactivates the account; a second call returns the inactive user.
    pub async fn delete(&self, actor: &Actor, id: Uuid) -> ServiceResult<UserWithRoles> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1 AND organization_id = $2")
            .bind(id)
            .bind(actor.organization_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ServiceError::NotFound("User".to_string()))?;

        if !user.is_active {
            return self.with_roles(user).await;
        }
        if user.id == actor.user_id {
            return Err(ServiceError::BadRequest("Users cannot deactivate themselves.".to_string()));
        }

        let user = sqlx::query_as::<_, User>(
            "UPDATE users SET is_active = FALSE, updated_by_id = $2, updated_at = NOW() WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(actor.user_id)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(user_id = %id, "user deactivated");
        self.with_roles(user).await
    }
}
