use serde::Deserialize;
use sqlx::PgPool;
use uuid::Uuid;

use super::{fetch_page, patch, patch_nullable, Actor, ServiceError, ServiceResult};
use crate::pagination::{PaginatedResponse, PaginationParams};
use crate::validation::{nullable, patched, Validate, ValidationResult, Validator};
use bcms_shared::Location;

pub const SORT_FIELDS: &[&str] = &["name", "city", "country", "created_at", "updated_at"];

#[derive(Debug, Clone, Deserialize)]
pub struct CreateLocation {
    pub name: String,
    pub address_line1: Option<String>,
    pub address_line2: Option<String>,
    pub city: Option<String>,
    pub state_province: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateLocation {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub address_line1: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub address_line2: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub city: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub state_province: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub postal_code: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub country: Option<Option<String>>,
}

impl Validate for CreateLocation {
    fn validate(&self) -> ValidationResult<()> {
        Validator::new()
            .name(&self.name, "name", 255)
            .max_length(self.address_line1.as_deref(), "address_line1", 255)
            .max_length(self.address_line2.as_deref(), "address_line2", 255)
            .max_length(self.city.as_deref(), "city", 100)
            .max_length(self.state_province.as_deref(), "state_province", 100)
            .max_length(self.postal_code.as_deref(), "postal_code", 20)
            .max_length(self.country.as_deref(), "country", 100)
            .finish()
    }
}

impl Validate for UpdateLocation {
    fn validate(&self) -> ValidationResult<()> {
        Validator::new()
            .optional_name(self.name.as_deref(), "name", 255)
            .max_length(patched(&self.address_line1), "address_line1", 255)
            .max_length(patched(&self.address_line2), "address_line2", 255)
            .max_length(patched(&self.city), "city", 100)
            .max_length(patched(&self.state_province), "state_province", 100)
            .max_length(patched(&self.postal_code), "postal_code", 20)
            .max_length(patched(&self.country), "country", 100)
            .finish()
    }
}

pub struct LocationService {
    pool: PgPool,
}

impl LocationService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn list(
        &self,
        actor: &Actor,
        params: &PaginationParams,
    ) -> ServiceResult<PaginatedResponse<Location>> {
        fetch_page(
            &self.pool,
            "locations",
            "is_active",
            actor.organization_id,
            params,
            SORT_FIELDS,
            "name",
        )
        .await
    }

    pub async fn get(&self, actor: &Actor, id: Uuid) -> ServiceResult<Location> {
        sqlx::query_as::<_, Location>(
            "SELECT * FROM locations WHERE id = $1 AND organization_id = $2 AND is_active",
        )
        .bind(id)
        .bind(actor.organization_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| ServiceError::NotFound("Location".to_string()))
    }

    async fn name_taken(&self, actor: &Actor, name: &str, except: Option<Uuid>) -> ServiceResult<bool> {
        let taken: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM locations
                WHERE organization_id = $1 AND name = $2 AND is_active
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

    pub async fn create(&self, actor: &Actor, input: CreateLocation) -> ServiceResult<Location> {
        let name = input.name.trim().to_string();
        if self.name_taken(actor, &name, None).await? {
            return Err(ServiceError::Conflict(format!(
                "Location with name '{}' already exists in this organization.",
                name
            )));
        }

        let location = sqlx::query_as::<_, Location>(
            r#"
            INSERT INTO locations (
                id, organization_id, name, address_line1, address_line2, city,
                state_province, postal_code, country, is_active, created_by_id, updated_by_id
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, TRUE, $10, $10)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(actor.organization_id)
        .bind(&name)
        .bind(input.address_line1)
        .bind(input.address_line2)
        .bind(input.city)
        .bind(input.state_province)
        .bind(input.postal_code)
        .bind(input.country)
        .bind(actor.user_id)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(location_id = %location.id, organization_id = %actor.organization_id, "location created");
        Ok(location)
    }

    pub async fn update(&self, actor: &Actor, id: Uuid, input: UpdateLocation) -> ServiceResult<Location> {
        let mut location = self.get(actor, id).await?;

        if let Some(name) = input.name.as_deref().map(str::trim) {
            if name != location.name && self.name_taken(actor, name, Some(id)).await? {
                return Err(ServiceError::Conflict(format!(
                    "Another location with name '{}' already exists in this organization.",
                    name
                )));
            }
        }

        patch(&mut location.name, input.name.map(|n| n.trim().to_string()));
        patch_nullable(&mut location.address_line1, input.address_line1);
        patch_nullable(&mut location.address_line2, input.address_line2);
        patch_nullable(&mut location.city, input.city);
        patch_nullable(&mut location.state_province, input.state_province);
        patch_nullable(&mut location.postal_code, input.postal_code);
        patch_nullable(&mut location.country, input.country);

        let location = sqlx::query_as::<_, Location>(
            r#"
            UPDATE locations
            SET name = $3, address_line1 = $4, address_line2 = $5, city = $6,
                state_province = $7, postal_code = $8, country = $9,
                updated_by_id = $10, updated_at = NOW()
            WHERE id = $1 AND organization_id = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(actor.organization_id)
        .bind(&location.name)
        .bind(&location.address_line1)
        .bind(&location.address_line2)
        .bind(&location.city)
        .bind(&location.state_province)
        .bind(&location.postal_code)
        .bind(&location.country)
        .bind(actor.user_id)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(location_id = %id, "location updated");
        Ok(location)
    }

    /// Soft delete; a second call returns the already inactive row.
    pub async fn delete(&self, actor: &Actor, id: Uuid) -> ServiceResult<Location> {
        let location = sqlx::query_as::<_, Location>(
            "SELECT * FROM locations WHERE id = $1 AND organization_id = $2",
        )
        .bind(id)
        .bind(actor.organization_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| ServiceError::NotFound("Location".to_string()))?;

        if !location.is_active {
            return Ok(location);
        }

        let location = sqlx::query_as::<_, Location>(
            r#"
            UPDATE locations
            SET is_active = FALSE, updated_by_id = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(actor.user_id)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(location_id = %id, "location deactivated");
        Ok(location)
    }
}
