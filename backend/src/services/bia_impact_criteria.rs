use serde::Deserialize;
use sqlx::{PgPool, Postgres, Transaction};
use std::collections::HashMap;
use uuid::Uuid;

use super::{
    all_exist_in_organization, fetch_page, patch, patch_nullable, Actor, AuditTrail, AuditUsers,
    ServiceError, ServiceResult,
};
use crate::pagination::{PaginatedResponse, PaginationParams};
use crate::validation::{nullable, Validate, ValidationResult, Validator};
use bcms_shared::{BiaImpactCriterion, BiaImpactCriterionDetail, BiaImpactCriterionLevel, RatingType};

pub const SORT_FIELDS: &[&str] = &["name", "rating_type", "created_at", "updated_at"];

const LEVELS_REQUIRED: &str = "At least one impact criterion level is required.";

#[derive(Debug, Clone, Deserialize)]
pub struct CriterionLevelInput {
    pub level_name: Option<String>,
    pub level_value_min: Option<f64>,
    pub level_value_max: Option<f64>,
    pub quantitative_level_descriptor: Option<String>,
    pub score: i32,
    #[serde(default)]
    pub sequence_order: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateImpactCriterion {
    pub bia_category_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub rating_type: RatingType,
    #[serde(default)]
    pub levels: Vec<CriterionLevelInput>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateImpactCriterion {
    pub bia_category_id: Option<Uuid>,
    pub name: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub description: Option<Option<String>>,
    pub rating_type: Option<RatingType>,
    pub levels: Option<Vec<CriterionLevelInput>>,
}

fn validate_levels(mut validator: Validator, levels: &[CriterionLevelInput]) -> Validator {
    for (i, level) in levels.iter().enumerate() {
        let inverted = matches!(
            (level.level_value_min, level.level_value_max),
            (Some(min), Some(max)) if min > max
        );
        validator = validator
            .max_length(level.level_name.as_deref(), &format!("levels[{}].level_name", i), 255)
            .max_length(
                level.quantitative_level_descriptor.as_deref(),
                &format!("levels[{}].quantitative_level_descriptor", i),
                255,
            )
            .non_negative_i32(Some(level.sequence_order), &format!("levels[{}].sequence_order", i))
            .error_if(
                inverted,
                &format!("levels[{}].level_value_max", i),
                "Maximum value must not be lower than the minimum value",
            );
    }
    validator
}

impl Validate for CreateImpactCriterion {
    fn validate(&self) -> ValidationResult<()> {
        let validator = Validator::new().name(&self.name, "name", 255);
        validate_levels(validator, &self.levels).finish()
    }
}

impl Validate for UpdateImpactCriterion {
    fn validate(&self) -> ValidationResult<()> {
        let validator = Validator::new().optional_name(self.name.as_deref(), "name", 255);
        validate_levels(validator, self.levels.as_deref().unwrap_or_default()).finish()
    }
}

pub struct BiaImpactCriterionService {
    pool: PgPool,
}

impl BiaImpactCriterionService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn details(&self, criteria: Vec<BiaImpactCriterion>) -> ServiceResult<Vec<BiaImpactCriterionDetail>> {
        let ids: Vec<Uuid> = criteria.iter().map(|c| c.id).collect();
        let levels = sqlx::query_as::<_, BiaImpactCriterionLevel>(
            r#"
            SELECT * FROM bia_impact_criterion_levels
            WHERE bia_impact_criterion_id = ANY($1) AND is_active
            ORDER BY sequence_order, score
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let audit_ids: Vec<Uuid> = criteria
            .iter()
            .flat_map(|c| [c.created_by_id(), c.updated_by_id()])
            .chain(levels.iter().flat_map(|l| [l.created_by_id(), l.updated_by_id()]))
            .flatten()
            .collect();
        let users = AuditUsers::load_ids(&self.pool, &audit_ids).await?;

        let mut grouped: HashMap<Uuid, Vec<_>> = HashMap::new();
        for level in levels {
            grouped
                .entry(level.bia_impact_criterion_id)
                .or_default()
                .push(users.attach(level));
        }

        Ok(criteria
            .into_iter()
            .map(|criterion| BiaImpactCriterionDetail {
                levels: grouped.remove(&criterion.id).unwrap_or_default(),
                criterion: users.attach(criterion),
            })
            .collect())
    }

    async fn detail(&self, criterion: BiaImpactCriterion) -> ServiceResult<BiaImpactCriterionDetail> {
        self.details(vec![criterion])
            .await?
            .pop()
            .ok_or_else(|| ServiceError::NotFound("BIA impact criterion".to_string()))
    }

    pub async fn list(
        &self,
        actor: &Actor,
        params: &PaginationParams,
    ) -> ServiceResult<PaginatedResponse<BiaImpactCriterionDetail>> {
        let page = fetch_page::<BiaImpactCriterion>(
            &self.pool,
            "bia_impact_criteria",
            "is_active",
            actor.organization_id,
            params,
            SORT_FIELDS,
            "name",
        )
        .await?;

        let details = self.details(page.data).await?;
        Ok(PaginatedResponse {
            data: details,
            meta: page.meta,
        })
    }

    async fn find_live(&self, actor: &Actor, id: Uuid) -> ServiceResult<BiaImpactCriterion> {
        sqlx::query_as::<_, BiaImpactCriterion>(
            "SELECT * FROM bia_impact_criteria WHERE id = $1 AND organization_id = $2 AND is_active",
        )
        .bind(id)
        .bind(actor.organization_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| ServiceError::NotFound("BIA impact criterion".to_string()))
    }

    pub async fn get(&self, actor: &Actor, id: Uuid) -> ServiceResult<BiaImpactCriterionDetail> {
        let criterion = self.find_live(actor, id).await?;
        self.detail(criterion).await
    }

    async fn check_category(&self, actor: &Actor, category_id: Uuid) -> ServiceResult<()> {
        if all_exist_in_organization(&self.pool, "bia_categories", "is_active", &[category_id], actor.organization_id)
            .await?
        {
            Ok(())
        } else {
            Err(ServiceError::NotFound("BIA category".to_string()))
        }
    }

    async fn name_taken(&self, category_id: Uuid, name: &str, except: Option<Uuid>) -> ServiceResult<bool> {
        let taken: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM bia_impact_criteria
                WHERE bia_category_id = $1 AND LOWER(name) = LOWER($2) AND is_active
                  AND ($3::uuid IS NULL OR id <> $3)
            )
            "#,
        )
        .bind(category_id)
        .bind(name)
        .bind(except)
        .fetch_one(&self.pool)
        .await?;
        Ok(taken)
    }

    fn duplicate_name(name: &str) -> ServiceError {
        ServiceError::Conflict(format!(
            "A BIA impact criterion with the name '{}' already exists in this category.",
            name
        ))
    }

    async fn insert_levels(
        tx: &mut Transaction<'_, Postgres>,
        actor: &Actor,
        criterion_id: Uuid,
        levels: &[CriterionLevelInput],
    ) -> ServiceResult<()> {
        for level in levels {
            sqlx::query(
                r#"
                INSERT INTO bia_impact_criterion_levels (
                    id, bia_impact_criterion_id, organization_id, level_name, level_value_min,
                    level_value_max, quantitative_level_descriptor, score, sequence_order,
                    created_by_id, updated_by_id
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $10)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(criterion_id)
            .bind(actor.organization_id)
            .bind(&level.level_name)
            .bind(level.level_value_min)
            .bind(level.level_value_max)
            .bind(&level.quantitative_level_descriptor)
            .bind(level.score)
            .bind(level.sequence_order)
            .bind(actor.user_id)
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }

    pub async fn create(
        &self,
        actor: &Actor,
        input: CreateImpactCriterion,
    ) -> ServiceResult<BiaImpactCriterionDetail> {
        if input.levels.is_empty() {
            return Err(ServiceError::BadRequest(LEVELS_REQUIRED.to_string()));
        }
        self.check_category(actor, input.bia_category_id).await?;

        let name = input.name.trim().to_string();
        if self.name_taken(input.bia_category_id, &name, None).await? {
            return Err(Self::duplicate_name(&name));
        }

        let mut tx = self.pool.begin().await?;

        let criterion = sqlx::query_as::<_, BiaImpactCriterion>(
            r#"
            INSERT INTO bia_impact_criteria (
                id, organization_id, bia_category_id, name, description, rating_type,
                created_by_id, updated_by_id
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $7)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(actor.organization_id)
        .bind(input.bia_category_id)
        .bind(&name)
        .bind(&input.description)
        .bind(input.rating_type)
        .bind(actor.user_id)
        .fetch_one(&mut *tx)
        .await?;

        Self::insert_levels(&mut tx, actor, criterion.id, &input.levels).await?;
        tx.commit().await?;

        tracing::info!(
            criterion_id = %criterion.id,
            category_id = %input.bia_category_id,
            levels = input.levels.len(),
            "bia impact criterion created"
        );
        self.detail(criterion).await
    }

    /// Updates the criterion; a given level list replaces the current levels.
    pub async fn update(
        &self,
        actor: &Actor,
        id: Uuid,
        input: UpdateImpactCriterion,
    ) -> ServiceResult<BiaImpactCriterionDetail> {
        let mut criterion = self.find_live(actor, id).await?;

        if input.levels.as_ref().is_some_and(Vec::is_empty) {
            return Err(ServiceError::BadRequest(LEVELS_REQUIRED.to_string()));
        }

        let new_category = input.bia_category_id.filter(|c| *c != criterion.bia_category_id);
        if let Some(category_id) = new_category {
            self.check_category(actor, category_id).await?;
            criterion.bia_category_id = category_id;
        }
        let category_changed = new_category.is_some();

        let name = input
            .name
            .as_deref()
            .map(str::trim)
            .unwrap_or(&criterion.name)
            .to_string();
        if (category_changed || !name.eq_ignore_ascii_case(&criterion.name))
            && self.name_taken(criterion.bia_category_id, &name, Some(id)).await?
        {
            return Err(Self::duplicate_name(&name));
        }

        criterion.name = name;
        patch(&mut criterion.rating_type, input.rating_type);
        patch_nullable(&mut criterion.description, input.description);

        let mut tx = self.pool.begin().await?;

        let criterion = sqlx::query_as::<_, BiaImpactCriterion>(
            r#"
            UPDATE bia_impact_criteria
            SET bia_category_id = $2, name = $3, description = $4, rating_type = $5,
                updated_by_id = $6, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(criterion.bia_category_id)
        .bind(&criterion.name)
        .bind(&criterion.description)
        .bind(criterion.rating_type)
        .bind(actor.user_id)
        .fetch_one(&mut *tx)
        .await?;

        if let Some(levels) = &input.levels {
            sqlx::query("DELETE FROM bia_impact_criterion_levels WHERE bia_impact_criterion_id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            Self::insert_levels(&mut tx, actor, id, levels).await?;
        }
        tx.commit().await?;

        tracing::info!(criterion_id = %id, "bia impact criterion updated");
        self.detail(criterion).await
    }

    /// Soft delete; a second call returns the already inactive row.
    pub async fn delete(&self, actor: &Actor, id: Uuid) -> ServiceResult<BiaImpactCriterionDetail> {
        let criterion = sqlx::query_as::<_, BiaImpactCriterion>(
            "SELECT * FROM bia_impact_criteria WHERE id = $1 AND organization_id = $2",
        )
        .bind(id)
        .bind(actor.organization_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| ServiceError::NotFound("BIA impact criterion".to_string()))?;

        if !criterion.is_active {
            return self.detail(criterion).await;
        }

        let criterion = sqlx::query_as::<_, BiaImpactCriterion>(
            r#"
            UPDATE bia_impact_criteria
            SET is_active = FALSE, updated_by_id = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(actor.user_id)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(criterion_id = %id, "bia impact criterion deleted");
        self.detail(criterion).await
    }
}
