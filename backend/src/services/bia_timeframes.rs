use serde::Deserialize;
use sqlx::PgPool;
use uuid::Uuid;

use super::{fetch_page, patch, patch_nullable, Actor, AuditUsers, ServiceError, ServiceResult};
use crate::pagination::{PaginatedResponse, PaginationParams};
use crate::validation::{nullable, Validate, ValidationResult, Validator};
use bcms_shared::{Audited, BiaTimeframe};

pub const SORT_FIELDS: &[&str] = &["sequence_order", "timeframe_name", "created_at", "updated_at"];

/// Ties on sequence order fall back to the name.
const DEFAULT_ORDER: &str = "sequence_order, timeframe_name";

#[derive(Debug, Clone, Deserialize)]
pub struct CreateTimeframe {
    pub timeframe_name: String,
    #[serde(default)]
    pub sequence_order: i32,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateTimeframe {
    pub timeframe_name: Option<String>,
    pub sequence_order: Option<i32>,
    #[serde(default, deserialize_with = "nullable")]
    pub description: Option<Option<String>>,
}

impl Validate for CreateTimeframe {
    fn validate(&self) -> ValidationResult<()> {
        Validator::new()
            .name(&self.timeframe_name, "timeframe_name", 255)
            .non_negative_i32(Some(self.sequence_order), "sequence_order")
            .finish()
    }
}

impl Validate for UpdateTimeframe {
    fn validate(&self) -> ValidationResult<()> {
        Validator::new()
            .optional_name(self.timeframe_name.as_deref(), "timeframe_name", 255)
            .non_negative_i32(self.sequence_order, "sequence_order")
            .finish()
    }
}

pub struct BiaTimeframeService {
    pool: PgPool,
}

impl BiaTimeframeService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn audited(&self, timeframe: BiaTimeframe) -> ServiceResult<Audited<BiaTimeframe>> {
        let users = AuditUsers::load(&self.pool, [&timeframe]).await?;
        Ok(users.attach(timeframe))
    }

    /// Active timeframes, by sequence order unless another sort is requested
    pub async fn list(
        &self,
        actor: &Actor,
        params: &PaginationParams,
    ) -> ServiceResult<PaginatedResponse<Audited<BiaTimeframe>>> {
        let page = fetch_page::<BiaTimeframe>(
            &self.pool,
            "bia_timeframes",
            "is_active",
            actor.organization_id,
            params,
            SORT_FIELDS,
            DEFAULT_ORDER,
        )
        .await?;

        let users = AuditUsers::load(&self.pool, &page.data).await?;
        Ok(page.map(|timeframe| users.attach(timeframe)))
    }

    async fn find_live(&self, actor: &Actor, id: Uuid) -> ServiceResult<BiaTimeframe> {
        sqlx::query_as::<_, BiaTimeframe>(
            "SELECT * FROM bia_timeframes WHERE id = $1 AND organization_id = $2 AND is_active",
        )
        .bind(id)
        .bind(actor.organization_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| ServiceError::NotFound("BIA timeframe".to_string()))
    }

    pub async fn get(&self, actor: &Actor, id: Uuid) -> ServiceResult<Audited<BiaTimeframe>> {
        let timeframe = self.find_live(actor, id).await?;
        self.audited(timeframe).await
    }

    async fn name_taken(&self, actor: &Actor, name: &str, except: Option<Uuid>) -> ServiceResult<bool> {
        let taken: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM bia_timeframes
                WHERE organization_id = $1 AND timeframe_name = $2 AND is_active
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
        ServiceError::Conflict(format!("A BIA timeframe with the name '{}' already exists.", name))
    }

    pub async fn create(&self, actor: &Actor, input: CreateTimeframe) -> ServiceResult<Audited<BiaTimeframe>> {
        let name = input.timeframe_name.trim().to_string();
        if self.name_taken(actor, &name, None).await? {
            return Err(Self::duplicate_name(&name));
        }

        let timeframe = sqlx::query_as::<_, BiaTimeframe>(
            r#"
            INSERT INTO bia_timeframes (
                id, organization_id, timeframe_name, sequence_order, description, created_by_id, updated_by_id
            )
            VALUES ($1, $2, $3, $4, $5, $6, $6)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(actor.organization_id)
        .bind(&name)
        .bind(input.sequence_order)
        .bind(input.description)
        .bind(actor.user_id)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(timeframe_id = %timeframe.id, organization_id = %actor.organization_id, "bia timeframe created");
        self.audited(timeframe).await
    }

    pub async fn update(
        &self,
        actor: &Actor,
        id: Uuid,
        input: UpdateTimeframe,
    ) -> ServiceResult<Audited<BiaTimeframe>> {
        let mut timeframe = self.find_live(actor, id).await?;

        if let Some(name) = input.timeframe_name.as_deref().map(str::trim) {
            if name != timeframe.timeframe_name && self.name_taken(actor, name, Some(id)).await? {
                return Err(Self::duplicate_name(name));
            }
        }

        patch(&mut timeframe.timeframe_name, input.timeframe_name.map(|n| n.trim().to_string()));
        patch(&mut timeframe.sequence_order, input.sequence_order);
        patch_nullable(&mut timeframe.description, input.description);

        let timeframe = sqlx::query_as::<_, BiaTimeframe>(
            r#"
            UPDATE bia_timeframes
            SET timeframe_name = $2, sequence_order = $3, description = $4,
                updated_by_id = $5, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&timeframe.timeframe_name)
        .bind(timeframe.sequence_order)
        .bind(&timeframe.description)
        .bind(actor.user_id)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(timeframe_id = %id, "bia timeframe updated");
        self.audited(timeframe).await
    }

    /// Soft delete; a second call returns the already inactive row.
    pub async fn delete(&self, actor: &Actor, id: Uuid) -> ServiceResult<Audited<BiaTimeframe>> {
        let timeframe = sqlx::query_as::<_, BiaTimeframe>(
            "SELECT * FROM bia_timeframes WHERE id = $1 AND organization_id = $2",
        )
        .bind(id)
        .bind(actor.organization_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| ServiceError::NotFound("BIA timeframe".to_string()))?;

        if !timeframe.is_active {
            return self.audited(timeframe).await;
        }

        let timeframe = sqlx::query_as::<_, BiaTimeframe>(
            r#"
            UPDATE bia_timeframes
            SET is_active = FALSE, updated_by_id = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(actor.user_id)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(timeframe_id = %id, "bia timeframe deleted");
        self.audited(timeframe).await
    }
}
