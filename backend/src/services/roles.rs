use serde::Deserialize;
use sqlx::{FromRow, PgPool};
use std::collections::HashMap;
use uuid::Uuid;

use super::{fetch_page, patch, patch_nullable, replace_links, unique_ids, Actor, ServiceError, ServiceResult};
use crate::pagination::{PaginatedResponse, PaginationParams};
use crate::validation::{nullable, patched, Validate, ValidationResult, Validator};
use bcms_shared::{Permission, Role, RoleWithPermissions};

pub const SORT_FIELDS: &[&str] = &["name", "created_at", "updated_at"];

const UNKNOWN_PERMISSIONS: &str = "One or more permission IDs are invalid.";

#[derive(Debug, Clone, Deserialize)]
pub struct CreateRole {
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub is_system_role: bool,
    #[serde(default)]
    pub permission_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateRole {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub description: Option<Option<String>>,
    pub permission_ids: Option<Vec<Uuid>>,
}

impl Validate for CreateRole {
    fn validate(&self) -> ValidationResult<()> {
        Validator::new()
            .name(&self.name, "name", 255)
            .max_length(self.description.as_deref(), "description", 10_000)
            .finish()
    }
}

impl Validate for UpdateRole {
    fn validate(&self) -> ValidationResult<()> {
        Validator::new()
            .optional_name(self.name.as_deref(), "name", 255)
            .max_length(patched(&self.description), "description", 10_000)
            .finish()
    }
}

#[derive(FromRow)]
struct GrantedPermission {
    role_id: Uuid,
    #[sqlx(flatten)]
    permission: Permission,
}

pub struct RoleService {
    pool: PgPool,
}

impl RoleService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The global permission catalog
    pub async fn list_permissions(&self) -> ServiceResult<Vec<Permission>> {
        let permissions = sqlx::query_as::<_, Permission>("SELECT * FROM permissions ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        Ok(permissions)
    }

    async fn permissions_for(&self, role_ids: &[Uuid]) -> ServiceResult<HashMap<Uuid, Vec<Permission>>> {
        let rows = sqlx::query_as::<_, GrantedPermission>(
            r#"
            SELECT rp.role_id, p.*
            FROM permissions p
            JOIN role_permissions rp ON rp.permission_id = p.id
            WHERE rp.role_id = ANY($1)
            ORDER BY p.name
            "#,
        )
        .bind(role_ids)
        .fetch_all(&self.pool)
        .await?;

        let mut grouped: HashMap<Uuid, Vec<Permission>> = HashMap::new();
        for row in rows {
            grouped.entry(row.role_id).or_default().push(row.permission);
        }
        Ok(grouped)
    }

    async fn with_permissions(&self, role: Role) -> ServiceResult<RoleWithPermissions> {
        let mut grouped = self.permissions_for(&[role.id]).await?;
        Ok(RoleWithPermissions {
            permissions: grouped.remove(&role.id).unwrap_or_default(),
            role,
        })
    }

    pub async fn list(
        &self,
        actor: &Actor,
        params: &PaginationParams,
    ) -> ServiceResult<PaginatedResponse<RoleWithPermissions>> {
        let page = fetch_page::<Role>(
            &self.pool,
            "roles",
            "TRUE",
            actor.organization_id,
            params,
            SORT_FIELDS,
            "name",
        )
        .await?;

        let ids: Vec<Uuid> = page.data.iter().map(|r| r.id).collect();
        let mut grouped = self.permissions_for(&ids).await?;

        Ok(page.map(|role| RoleWithPermissions {
            permissions: grouped.remove(&role.id).unwrap_or_default(),
            role,
        }))
    }

    async fn find(&self, actor: &Actor, id: Uuid) -> ServiceResult<Role> {
        sqlx::query_as::<_, Role>("SELECT * FROM roles WHERE id = $1 AND organization_id = $2")
            .bind(id)
            .bind(actor.organization_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Role".to_string()))
    }

    pub async fn get(&self, actor: &Actor, id: Uuid) -> ServiceResult<RoleWithPermissions> {
        let role = self.find(actor, id).await?;
        self.with_permissions(role).await
    }

    async fn name_taken(&self, actor: &Actor, name: &str, except: Option<Uuid>) -> ServiceResult<bool> {
        let taken: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM roles
                WHERE organization_id = $1 AND name = $2
                  AND ($3::uuid IS NULL OR id <> $3)
            )
            "#,
        )
        .bind(actor.organization_id)
        .bind(name)
        .bind(except)
        .fetch_one(&self.pool)
        .await?;
        Ok(taken)
    }

    async fn check_permissions(&self, permission_ids: &[Uuid]) -> ServiceResult<()> {
        let ids = unique_ids(permission_ids);
        if ids.is_empty() {
            return Ok(());
        }
        let found: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM permissions WHERE id = ANY($1)")
            .bind(&ids)
            .fetch_one(&self.pool)
            .await?;
        if found as usize == ids.len() {
            Ok(())
        } else {
            Err(ServiceError::Unprocessable(UNKNOWN_PERMISSIONS.to_string()))
        }
    }

    pub async fn create(&self, actor: &Actor, input: CreateRole) -> ServiceResult<RoleWithPermissions> {
        let name = input.name.trim().to_string();
        if self.name_taken(actor, &name, None).await? {
            return Err(ServiceError::Conflict(format!(
                "A role with the name '{}' already exists in this organization.",
                name
            )));
        }
        self.check_permissions(&input.permission_ids).await?;

        let mut tx = self.pool.begin().await?;

        let role = sqlx::query_as::<_, Role>(
            r#"
            INSERT INTO roles (id, organization_id, name, description, is_system_role)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(actor.organization_id)
        .bind(&name)
        .bind(&input.description)
        .bind(input.is_system_role)
        .fetch_one(&mut *tx)
        .await?;

        replace_links(&mut tx, "role_permissions", "role_id", role.id, "permission_id", &input.permission_ids)
            .await?;
        tx.commit().await?;

        tracing::info!(role_id = %role.id, organization_id = %actor.organization_id, "role created");
        self.with_permissions(role).await
    }

    pub async fn update(&self, actor: &Actor, id: Uuid, input: UpdateRole) -> ServiceResult<RoleWithPermissions> {
        let mut role = self.find(actor, id).await?;

        if let Some(name) = input.name.as_deref().map(str::trim) {
            if name != role.name && self.name_taken(actor, name, Some(id)).await? {
                return Err(ServiceError::Conflict(format!(
                    "A role with the name '{}' already exists in this organization.",
                    name
                )));
            }
        }
        if let Some(permission_ids) = &input.permission_ids {
            self.check_permissions(permission_ids).await?;
        }

        patch(&mut role.name, input.name.map(|n| n.trim().to_string()));
        patch_nullable(&mut role.description, input.description);

        let mut tx = self.pool.begin().await?;

        let role = sqlx::query_as::<_, Role>(
            "UPDATE roles SET name = $2, description = $3, updated_at = NOW() WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(&role.name)
        .bind(&role.description)
        .fetch_one(&mut *tx)
        .await?;

        if let Some(permission_ids) = &input.permission_ids {
            replace_links(&mut tx, "role_permissions", "role_id", id, "permission_id", permission_ids).await?;
        }
        tx.commit().await?;

        tracing::info!(role_id = %id, "role updated");
        self.with_permissions(role).await
    }

    /// Removes the role and its user and permission links.
    pub async fn delete(&self, actor: &Actor, id: Uuid) -> ServiceResult<RoleWithPermissions> {
        let role = self.get(actor, id).await?;
        if role.role.is_system_role {
            return Err(ServiceError::BadRequest("System roles cannot be deleted.".to_string()));
        }

        sqlx::query("DELETE FROM roles WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        tracing::info!(role_id = %id, "role deleted");
        Ok(role)
    }
}
