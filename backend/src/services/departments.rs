use serde::Deserialize;
use sqlx::{FromRow, PgPool};
use std::collections::HashMap;
use uuid::Uuid;

use super::{
    all_exist_in_organization, patch, patch_nullable, replace_links, Actor, ServiceError,
    ServiceResult,
};
use crate::pagination::{PaginatedResponse, PaginationParams};
use crate::validation::{nullable, patched, Validate, ValidationResult, Validator};
use bcms_shared::{Department, DepartmentDetail, Location};

pub const SORT_FIELDS: &[&str] = &["name", "number_of_team_members", "created_at", "updated_at"];

const DUPLICATE_NAME: &str = "Department with this name already exists in the organization.";
const UNKNOWN_LOCATIONS: &str =
    "One or more locations not found or do not belong to the organization.";
const LOCATIONS_IN_USE: &str =
    "One or more locations are still used by processes in this department.";

#[derive(Debug, Clone, Deserialize)]
pub struct CreateDepartment {
    pub name: String,
    pub description: Option<String>,
    /// Must match the caller's organization when given
    #[serde(default, alias = "organizationId")]
    pub organization_id: Option<Uuid>,
    pub department_head_id: Option<Uuid>,
    pub number_of_team_members: Option<i32>,
    #[serde(default)]
    pub location_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateDepartment {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub description: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub department_head_id: Option<Option<Uuid>>,
    #[serde(default, deserialize_with = "nullable")]
    pub number_of_team_members: Option<Option<i32>>,
    /// Omitted leaves links untouched; an empty list clears them
    pub location_ids: Option<Vec<Uuid>>,
}

impl Validate for CreateDepartment {
    fn validate(&self) -> ValidationResult<()> {
        Validator::new()
            .name(&self.name, "name", 255)
            .non_negative_i32(self.number_of_team_members, "number_of_team_members")
            .finish()
    }
}

impl Validate for UpdateDepartment {
    fn validate(&self) -> ValidationResult<()> {
        Validator::new()
            .optional_name(self.name.as_deref(), "name", 255)
            .max_length(patched(&self.description), "description", 10_000)
            .non_negative_i32(self.number_of_team_members.flatten(), "number_of_team_members")
            .finish()
    }
}

#[derive(FromRow)]
struct LinkedLocation {
    department_id: Uuid,
    #[sqlx(flatten)]
    location: Location,
}

pub struct DepartmentService {
    pool: PgPool,
}

impl DepartmentService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn locations_for(&self, department_ids: &[Uuid]) -> ServiceResult<HashMap<Uuid, Vec<Location>>> {
        let rows = sqlx::query_as::<_, LinkedLocation>(
            r#"
            SELECT dl.department_id, l.*
            FROM locations l
            JOIN department_locations dl ON dl.location_id = l.id
            WHERE dl.department_id = ANY($1) AND l.is_active
            ORDER BY l.name
            "#,
        )
        .bind(department_ids)
        .fetch_all(&self.pool)
        .await?;

        let mut grouped: HashMap<Uuid, Vec<Location>> = HashMap::new();
        for row in rows {
            grouped.entry(row.department_id).or_default().push(row.location);
        }
        Ok(grouped)
    }

    async fn with_locations(&self, department: Department) -> ServiceResult<DepartmentDetail> {
        let mut grouped = self.locations_for(&[department.id]).await?;
        Ok(DepartmentDetail {
            locations: grouped.remove(&department.id).unwrap_or_default(),
            department,
        })
    }

    pub async fn list(
        &self,
        actor: &Actor,
        params: &PaginationParams,
    ) -> ServiceResult<PaginatedResponse<DepartmentDetail>> {
        let page = super::fetch_page::<Department>(
            &self.pool,
            "departments",
            "NOT is_deleted",
            actor.organization_id,
            params,
            SORT_FIELDS,
            "name",
        )
        .await?;

        let ids: Vec<Uuid> = page.data.iter().map(|d| d.id).collect();
        let mut grouped = self.locations_for(&ids).await?;

        Ok(page.map(|department| DepartmentDetail {
            locations: grouped.remove(&department.id).unwrap_or_default(),
            department,
        }))
    }

    async fn find_live(&self, actor: &Actor, id: Uuid) -> ServiceResult<Department> {
        sqlx::query_as::<_, Department>(
            "SELECT * FROM departments WHERE id = $1 AND organization_id = $2 AND NOT is_deleted",
        )
        .bind(id)
        .bind(actor.organization_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| ServiceError::NotFound("Department".to_string()))
    }

    pub async fn get(&self, actor: &Actor, id: Uuid) -> ServiceResult<DepartmentDetail> {
        let department = self.find_live(actor, id).await?;
        self.with_locations(department).await
    }

    async fn name_taken(&self, actor: &Actor, name: &str, except: Option<Uuid>) -> ServiceResult<bool> {
        let taken: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM departments
                WHERE organization_id = $1 AND name = $2 AND NOT is_deleted
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

    async fn check_head(&self, actor: &Actor, head_id: Option<Uuid>) -> ServiceResult<()> {
        let Some(head_id) = head_id else {
            return Ok(());
        };
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM users WHERE id = $1 AND organization_id = $2 AND is_active)",
        )
        .bind(head_id)
        .bind(actor.organization_id)
        .fetch_one(&self.pool)
        .await?;

        if exists {
            Ok(())
        } else {
            Err(ServiceError::NotFound("Department head".to_string()))
        }
    }

    async fn check_locations(&self, actor: &Actor, location_ids: &[Uuid]) -> ServiceResult<()> {
        if all_exist_in_organization(&self.pool, "locations", "is_active", location_ids, actor.organization_id)
            .await?
        {
            Ok(())
        } else {
            Err(ServiceError::BadRequest(UNKNOWN_LOCATIONS.to_string()))
        }
    }

    /// Locations may only be unlinked once no live process here still uses them
    async fn check_locations_unused(&self, id: Uuid, keep: &[Uuid]) -> ServiceResult<()> {
        let in_use: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(DISTINCT pl.location_id)
            FROM process_locations pl
            JOIN processes p ON p.id = pl.process_id
            WHERE p.department_id = $1 AND NOT p.is_deleted AND NOT (pl.location_id = ANY($2))
            "#,
        )
        .bind(id)
        .bind(keep)
        .fetch_one(&self.pool)
        .await?;

        if in_use > 0 {
            return Err(ServiceError::BadRequest(LOCATIONS_IN_USE.to_string()));
        }
        Ok(())
    }

    pub async fn create(&self, actor: &Actor, input: CreateDepartment) -> ServiceResult<DepartmentDetail> {
        if input.organization_id.is_some_and(|org| org != actor.organization_id) {
            return Err(ServiceError::NotFound("Organization".to_string()));
        }

        let name = input.name.trim().to_string();
        if self.name_taken(actor, &name, None).await? {
            return Err(ServiceError::Conflict(DUPLICATE_NAME.to_string()));
        }
        self.check_head(actor, input.department_head_id).await?;
        self.check_locations(actor, &input.location_ids).await?;

        let mut tx = self.pool.begin().await?;

        let department = sqlx::query_as::<_, Department>(
            r#"
            INSERT INTO departments (
                id, organization_id, name, description, department_head_id,
                number_of_team_members, created_by_id, updated_by_id
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $7)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(actor.organization_id)
        .bind(&name)
        .bind(&input.description)
        .bind(input.department_head_id)
        .bind(input.number_of_team_members)
        .bind(actor.user_id)
        .fetch_one(&mut *tx)
        .await?;

        replace_links(
            &mut tx,
            "department_locations",
            "department_id",
            department.id,
            "location_id",
            &input.location_ids,
        )
        .await?;

        tx.commit().await?;

        tracing::info!(department_id = %department.id, organization_id = %actor.organization_id, "department created");
        self.with_locations(department).await
    }

    pub async fn update(
        &self,
        actor: &Actor,
        id: Uuid,
        input: UpdateDepartment,
    ) -> ServiceResult<DepartmentDetail> {
        let mut department = self.find_live(actor, id).await?;

        if let Some(name) = input.name.as_deref().map(str::trim) {
            if name != department.name && self.name_taken(actor, name, Some(id)).await? {
                return Err(ServiceError::Conflict(DUPLICATE_NAME.to_string()));
            }
        }
        if let Some(head) = input.department_head_id {
            self.check_head(actor, head).await?;
        }
        if let Some(location_ids) = &input.location_ids {
            self.check_locations(actor, location_ids).await?;
            self.check_locations_unused(id, location_ids).await?;
        }

        patch(&mut department.name, input.name.map(|n| n.trim().to_string()));
        patch_nullable(&mut department.description, input.description);
        patch_nullable(&mut department.department_head_id, input.department_head_id);
        patch_nullable(&mut department.number_of_team_members, input.number_of_team_members);

        let mut tx = self.pool.begin().await?;

        let department = sqlx::query_as::<_, Department>(
            r#"
            UPDATE departments
            SET name = $2, description = $3, department_head_id = $4,
                number_of_team_members = $5, updated_by_id = $6, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&department.name)
        .bind(&department.description)
        .bind(department.department_head_id)
        .bind(department.number_of_team_members)
        .bind(actor.user_id)
        .fetch_one(&mut *tx)
        .await?;

        if let Some(location_ids) = &input.location_ids {
            replace_links(&mut tx, "department_locations", "department_id", id, "location_id", location_ids)
                .await?;
        }

        tx.commit().await?;

        tracing::info!(department_id = %id, "department updated");
        self.with_locations(department).await
    }

    /// Soft delete; a second call returns the already deleted row.
    pub async fn delete(&self, actor: &Actor, id: Uuid) -> ServiceResult<DepartmentDetail> {
        let department = sqlx::query_as::<_, Department>(
            "SELECT * FROM departments WHERE id = $1 AND organization_id = $2",
        )
        .bind(id)
        .bind(actor.organization_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| ServiceError::NotFound("Department".to_string()))?;

        if department.is_deleted {
            return self.with_locations(department).await;
        }

        let department = sqlx::query_as::<_, Department>(
            r#"
            UPDATE departments
            SET is_active = FALSE, is_deleted = TRUE, deleted_at = NOW(),
                updated_by_id = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(actor.user_id)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(department_id = %id, "department deleted");
        self.with_locations(department).await
    }
}
