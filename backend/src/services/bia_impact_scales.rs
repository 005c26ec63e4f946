use serde::Deserialize;
use sqlx::{PgPool, Postgres, Transaction};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use super::{fetch_page, patch, patch_nullable, Actor, AuditTrail, AuditUsers, ServiceError, ServiceResult};
use crate::pagination::{PaginatedResponse, PaginationParams};
use crate::validation::{nullable, Validate, ValidationResult, Validator};
use bcms_shared::{BiaImpactScale, BiaImpactScaleDetail, BiaImpactScaleLevel};

pub const SORT_FIELDS: &[&str] = &["scale_name", "created_at", "updated_at"];

const DUPLICATE_LEVELS: &str = "Duplicate level value or name within the same impact scale.";

#[derive(Debug, Clone, Deserialize)]
pub struct ScaleLevelInput {
    pub level_value: i32,
    pub level_name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateImpactScale {
    pub scale_name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub levels: Vec<ScaleLevelInput>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateImpactScale {
    pub scale_name: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub description: Option<Option<String>>,
    pub levels: Option<Vec<ScaleLevelInput>>,
}

fn validate_levels(mut validator: Validator, levels: &[ScaleLevelInput]) -> Validator {
    for (i, level) in levels.iter().enumerate() {
        validator = validator
            .at_least_i32(Some(level.level_value), &format!("levels[{}].level_value", i), 1)
            .name(&level.level_name, &format!("levels[{}].level_name", i), 255);
    }
    validator
}

impl Validate for CreateImpactScale {
    fn validate(&self) -> ValidationResult<()> {
        let validator = Validator::new().name(&self.scale_name, "scale_name", 255);
        validate_levels(validator, &self.levels).finish()
    }
}

impl Validate for UpdateImpactScale {
    fn validate(&self) -> ValidationResult<()> {
        let validator = Validator::new().optional_name(self.scale_name.as_deref(), "scale_name", 255);
        validate_levels(validator, self.levels.as_deref().unwrap_or_default()).finish()
    }
}

/// Two levels of one scale may share neither a value nor a name.
pub fn has_duplicate_levels(levels: &[ScaleLevelInput]) -> bool {
    let mut values = HashSet::new();
    let mut names = HashSet::new();
    levels
        .iter()
        .any(|level| !values.insert(level.level_value) || !names.insert(level.level_name.trim()))
}

pub struct BiaImpactScaleService {
    pool: PgPool,
}

impl BiaImpactScaleService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Live levels of live scales; a deleted scale keeps showing its cascaded levels
    async fn levels_for(&self, scale_ids: &[Uuid]) -> ServiceResult<Vec<BiaImpactScaleLevel>> {
        let levels = sqlx::query_as::<_, BiaImpactScaleLevel>(
            r#"
            SELECT l.* FROM bia_impact_scale_levels l
            JOIN bia_impact_scales s ON s.id = l.impact_scale_id
            WHERE l.impact_scale_id = ANY($1) AND (s.is_deleted OR NOT l.is_deleted)
            ORDER BY l.level_value
            "#,
        )
        .bind(scale_ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(levels)
    }

    async fn details(&self, scales: Vec<BiaImpactScale>) -> ServiceResult<Vec<BiaImpactScaleDetail>> {
        let ids: Vec<Uuid> = scales.iter().map(|s| s.id).collect();
        let levels = self.levels_for(&ids).await?;

        let audit_ids: Vec<Uuid> = scales
            .iter()
            .flat_map(|s| [s.created_by_id(), s.updated_by_id()])
            .chain(levels.iter().flat_map(|l| [l.created_by_id(), l.updated_by_id()]))
            .flatten()
            .collect();
        let users = AuditUsers::load_ids(&self.pool, &audit_ids).await?;

        let mut grouped: HashMap<Uuid, Vec<_>> = HashMap::new();
        for level in levels {
            grouped.entry(level.impact_scale_id).or_default().push(users.attach(level));
        }

        Ok(scales
            .into_iter()
            .map(|scale| BiaImpactScaleDetail {
                levels: grouped.remove(&scale.id).unwrap_or_default(),
                scale: users.attach(scale),
            })
            .collect())
    }

    async fn detail(&self, scale: BiaImpactScale) -> ServiceResult<BiaImpactScaleDetail> {
        self.details(vec![scale])
            .await?
            .pop()
            .ok_or_else(|| ServiceError::NotFound("BIA impact scale".to_string()))
    }

    pub async fn list(
        &self,
        actor: &Actor,
        params: &PaginationParams,
    ) -> ServiceResult<PaginatedResponse<BiaImpactScaleDetail>> {
        let page = fetch_page::<BiaImpactScale>(
            &self.pool,
            "bia_impact_scales",
            "NOT is_deleted",
            actor.organization_id,
            params,
            SORT_FIELDS,
            "scale_name",
        )
        .await?;

        let details = self.details(page.data).await?;
        Ok(PaginatedResponse {
            data: details,
            meta: page.meta,
        })
    }

    async fn find_live(&self, actor: &Actor, id: Uuid) -> ServiceResult<BiaImpactScale> {
        sqlx::query_as::<_, BiaImpactScale>(
            "SELECT * FROM bia_impact_scales WHERE id = $1 AND organization_id = $2 AND NOT is_deleted",
        )
        .bind(id)
        .bind(actor.organization_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| ServiceError::NotFound("BIA impact scale".to_string()))
    }

    pub async fn get(&self, actor: &Actor, id: Uuid) -> ServiceResult<BiaImpactScaleDetail> {
        let scale = self.find_live(actor, id).await?;
        self.detail(scale).await
    }

    async fn name_taken(&self, actor: &Actor, name: &str, except: Option<Uuid>) -> ServiceResult<bool> {
        let taken: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM bia_impact_scales
                WHERE organization_id = $1 AND LOWER(scale_name) = LOWER($2) AND NOT is_deleted
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

    fn duplicate_name(name: &str) -> ServiceError {
        ServiceError::Conflict(format!(
            "A BIA impact scale with the name '{}' already exists in this organization.",
            name
        ))
    }

    async fn insert_levels(
        tx: &mut Transaction<'_, Postgres>,
        actor: &Actor,
        scale_id: Uuid,
        levels: &[ScaleLevelInput],
    ) -> ServiceResult<()> {
        for level in levels {
            sqlx::query(
                r#"
                INSERT INTO bia_impact_scale_levels (
                    id, impact_scale_id, level_value, level_name, description, created_by_id, updated_by_id
                )
                VALUES ($1, $2, $3, $4, $5, $6, $6)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(scale_id)
            .bind(level.level_value)
            .bind(level.level_name.trim())
            .bind(&level.description)
            .bind(actor.user_id)
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }

    pub async fn create(&self, actor: &Actor, input: CreateImpactScale) -> ServiceResult<BiaImpactScaleDetail> {
        let scale_name = input.scale_name.trim().to_string();
        if self.name_taken(actor, &scale_name, None).await? {
            return Err(Self::duplicate_name(&scale_name));
        }
        if has_duplicate_levels(&input.levels) {
            return Err(ServiceError::BadRequest(DUPLICATE_LEVELS.to_string()));
        }

        let mut tx = self.pool.begin().await?;

        let scale = sqlx::query_as::<_, BiaImpactScale>(
            r#"
            INSERT INTO bia_impact_scales (id, organization_id, scale_name, description, created_by_id, updated_by_id)
            VALUES ($1, $2, $3, $4, $5, $5)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(actor.organization_id)
        .bind(&scale_name)
        .bind(&input.description)
        .bind(actor.user_id)
        .fetch_one(&mut *tx)
        .await?;

        Self::insert_levels(&mut tx, actor, scale.id, &input.levels).await?;
        tx.commit().await?;

        tracing::info!(
            impact_scale_id = %scale.id,
            levels = input.levels.len(),
            "bia impact scale created"
        );
        self.detail(scale).await
    }

    /// Updates the scale; a given level list replaces the current levels.
    pub async fn update(
        &self,
        actor: &Actor,
        id: Uuid,
        input: UpdateImpactScale,
    ) -> ServiceResult<BiaImpactScaleDetail> {
        let mut scale = self.find_live(actor, id).await?;

        if let Some(name) = input.scale_name.as_deref().map(str::trim) {
            if !name.eq_ignore_ascii_case(&scale.scale_name) && self.name_taken(actor, name, Some(id)).await? {
                return Err(Self::duplicate_name(name));
            }
        }
        if let Some(levels) = &input.levels {
            if has_duplicate_levels(levels) {
                return Err(ServiceError::BadRequest(DUPLICATE_LEVELS.to_string()));
            }
        }

        patch(&mut scale.scale_name, input.scale_name.map(|n| n.trim().to_string()));
        patch_nullable(&mut scale.description, input.description);

        let mut tx = self.pool.begin().await?;

        let scale = sqlx::query_as::<_, BiaImpactScale>(
            r#"
            UPDATE bia_impact_scales
            SET scale_name = $2, description = $3, updated_by_id = $4, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&scale.scale_name)
        .bind(&scale.description)
        .bind(actor.user_id)
        .fetch_one(&mut *tx)
        .await?;

        if let Some(levels) = &input.levels {
            sqlx::query("DELETE FROM bia_impact_scale_levels WHERE impact_scale_id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            Self::insert_levels(&mut tx, actor, id, levels).await?;
        }
        tx.commit().await?;

        tracing::info!(impact_scale_id = %id, "bia impact scale updated");
        self.detail(scale).await
    }

    /// Soft deletes the scale together with its levels.
    pub async fn delete(&self, actor: &Actor, id: Uuid) -> ServiceResult<BiaImpactScaleDetail> {
        let scale = sqlx::query_as::<_, BiaImpactScale>(
            "SELECT * FROM bia_impact_scales WHERE id = $1 AND organization_id = $2",
        )
        .bind(id)
        .bind(actor.organization_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| ServiceError::NotFound("BIA impact scale".to_string()))?;

        if scale.is_deleted {
            return self.detail(scale).await;
        }

        let mut tx = self.pool.begin().await?;

        let scale = sqlx::query_as::<_, BiaImpactScale>(
            r#"
            UPDATE bia_impact_scales
            SET is_active = FALSE, is_deleted = TRUE, deleted_at = NOW(),
                updated_by_id = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(actor.user_id)
        .fetch_one(&mut *tx)
        .await?;

        let levels = sqlx::query(
            r#"
            UPDATE bia_impact_scale_levels
            SET is_active = FALSE, is_deleted = TRUE, deleted_at = NOW(),
                updated_by_id = $2, updated_at = NOW()
            WHERE impact_scale_id = $1 AND NOT is_deleted
            "#,
        )
        .bind(id)
        .bind(actor.user_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            impact_scale_id = %id,
            levels = levels.rows_affected(),
            "bia impact scale deleted"
        );
        self.detail(scale).await
    }
}
