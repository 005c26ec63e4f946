use serde::Deserialize;
use sqlx::PgPool;
use uuid::Uuid;

use super::{fetch_page, patch, patch_nullable, Actor, AuditUsers, ServiceError, ServiceResult};
use crate::pagination::{PaginatedResponse, PaginationParams};
use crate::validation::{nullable, Validate, ValidationResult, Validator};
use bcms_shared::{Audited, BiaCategory};

pub const SORT_FIELDS: &[&str] = &["name", "created_at", "updated_at"];

#[derive(Debug, Clone, Deserialize)]
pub struct CreateBiaCategory {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateBiaCategory {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub description: Option<Option<String>>,
}

impl Validate for CreateBiaCategory {
    fn validate(&self) -> ValidationResult<()> {
        Validator::new().name(&self.name, "name", 255).finish()
    }
}

impl Validate for UpdateBiaCategory {
    fn validate(&self) -> ValidationResult<()> {
        Validator::new().optional_name(self.name.as_deref(), "name", 255).finish()
    }
}

pub struct BiaCategoryService {
    pool: PgPool,
}

impl BiaCategoryService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn audited(&self, category: BiaCategory) -> ServiceResult<Audited<BiaCategory>> {
        let users = AuditUsers::load(&self.pool, [&category]).await?;
        Ok(users.attach(category))
    }

    pub async fn list(
        &self,
        actor: &Actor,
        params: &PaginationParams,
    ) -> ServiceResult<PaginatedResponse<Audited<BiaCategory>>> {
        let page = fetch_page::<BiaCategory>(
            &self.pool,
            "bia_categories",
            "is_active",
            actor.organization_id,
            params,
            SORT_FIELDS,
            "name",
        )
        .await?;

        let users = AuditUsers::load(&self.pool, &page.data).await?;
        Ok(page.map(|category| users.attach(category)))
    }

    async fn find_live(&self, actor: &Actor, id: Uuid) -> ServiceResult<BiaCategory> {
        sqlx::query_as::<_, BiaCategory>(
            "SELECT * FROM bia_categories WHERE id = $1 AND organization_id = $2 AND is_active",
        )
        .bind(id)
        .bind(actor.organization_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| ServiceError::NotFound("BIA category".to_string()))
    }

    pub async fn get(&self, actor: &Actor, id: Uuid) -> ServiceResult<Audited<BiaCategory>> {
        let category = self.find_live(actor, id).await?;
        self.audited(category).await
    }

    async fn name_taken(&self, actor: &Actor, name: &str, except: Option<Uuid>) -> ServiceResult<bool> {
        let taken: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM bia_categories
                WHERE organization_id = $1 AND LOWER(name) = LOWER($2) AND is_active
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
            "A BIA category with the name '{}' already exists in this organization.",
            name
        ))
    }

    pub async fn create(&self, actor: &Actor, input: CreateBiaCategory) -> ServiceResult<Audited<BiaCategory>> {
        let name = input.name.trim().to_string();
        if self.name_taken(actor, &name, None).await? {
            return Err(Self::duplicate_name(&name));
        }

        let category = sqlx::query_as::<_, BiaCategory>(
            r#"
            INSERT INTO bia_categories (id, organization_id, name, description, created_by_id, updated_by_id)
            VALUES ($1, $2, $3, $4, $5, $5)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(actor.organization_id)
        .bind(&name)
        .bind(input.description)
        .bind(actor.user_id)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(bia_category_id = %category.id, organization_id = %actor.organization_id, "bia category created");
        self.audited(category).await
    }

    pub async fn update(
        &self,
        actor: &Actor,
        id: Uuid,
        input: UpdateBiaCategory,
    ) -> ServiceResult<Audited<BiaCategory>> {
        let mut category = self.find_live(actor, id).await?;

        if let Some(name) = input.name.as_deref().map(str::trim) {
            if !name.eq_ignore_ascii_case(&category.name) && self.name_taken(actor, name, Some(id)).await? {
                return Err(Self::duplicate_name(name));
            }
        }

        patch(&mut category.name, input.name.map(|n| n.trim().to_string()));
        patch_nullable(&mut category.description, input.description);

        let category = sqlx::query_as::<_, BiaCategory>(
            r#"
            UPDATE bia_categories
            SET name = $2, description = $3, updated_by_id = $4, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&category.name)
        .bind(&category.description)
        .bind(actor.user_id)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(bia_category_id = %id, "bia category updated");
        self.audited(category).await
    }

    /// Soft delete; a second call returns the already inactive row.
    pub async fn delete(&self, actor: &Actor, id: Uuid) -> ServiceResult<Audited<BiaCategory>> {
        let category = sqlx::query_as::<_, BiaCategory>(
            "SELECT * FROM bia_categories WHERE id = $1 AND organization_id = $2",
        )
        .bind(id)
        .bind(actor.organization_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| ServiceError::NotFound("BIA category".to_string()))?;

        if !category.is_active {
            return self.audited(category).await;
        }

        let category = sqlx::query_as::<_, BiaCategory>(
            r#"
            UPDATE bia_categories
            SET is_active = FALSE, updated_by_id = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(actor.user_id)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(bia_category_id = %id, "bia category deleted");
        self.audited(category).await
    }
}
