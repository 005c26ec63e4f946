use serde::Deserialize;
use sqlx::PgPool;
use uuid::Uuid;

use super::{all_exist_in_organization, fetch_page, patch, patch_nullable, Actor, ServiceError, ServiceResult};
use crate::pagination::{PaginatedResponse, PaginationParams};
use crate::validation::{nullable, patched, Validate, ValidationResult, Validator};
use bcms_shared::Application;

pub const SORT_FIELDS: &[&str] = &[
    "name",
    "application_type",
    "hosting_environment",
    "criticality",
    "created_at",
    "updated_at",
];

#[derive(Debug, Clone, Deserialize)]
pub struct CreateApplication {
    pub name: String,
    pub description: Option<String>,
    pub app_owner_id: Option<Uuid>,
    pub application_type: Option<String>,
    pub hosting_environment: Option<String>,
    pub criticality: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateApplication {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub description: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub app_owner_id: Option<Option<Uuid>>,
    #[serde(default, deserialize_with = "nullable")]
    pub application_type: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub hosting_environment: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub criticality: Option<Option<String>>,
}

impl Validate for CreateApplication {
    fn validate(&self) -> ValidationResult<()> {
        Validator::new()
            .name(&self.name, "name", 255)
            .max_length(self.application_type.as_deref(), "application_type", 100)
            .max_length(self.hosting_environment.as_deref(), "hosting_environment", 100)
            .max_length(self.criticality.as_deref(), "criticality", 50)
            .finish()
    }
}

impl Validate for UpdateApplication {
    fn validate(&self) -> ValidationResult<()> {
        Validator::new()
            .optional_name(self.name.as_deref(), "name", 255)
            .max_length(patched(&self.application_type), "application_type", 100)
            .max_length(patched(&self.hosting_environment), "hosting_environment", 100)
            .max_length(patched(&self.criticality), "criticality", 50)
            .finish()
    }
}

pub struct ApplicationService {
    pool: PgPool,
}

impl ApplicationService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn list(
        &self,
        actor: &Actor,
        params: &PaginationParams,
    ) -> ServiceResult<PaginatedResponse<Application>> {
        fetch_page(
            &self.pool,
            "applications",
            "deleted_at IS NULL",
            actor.organization_id,
            params,
            SORT_FIELDS,
            "name",
        )
        .await
    }

    pub async fn get(&self, actor: &Actor, id: Uuid) -> ServiceResult<Application> {
        sqlx::query_as::<_, Application>(
            "SELECT * FROM applications WHERE id = $1 AND organization_id = $2 AND deleted_at IS NULL",
        )
        .bind(id)
        .bind(actor.organization_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| ServiceError::NotFound("Application".to_string()))
    }

    async fn name_taken(&self, actor: &Actor, name: &str, except: Option<Uuid>) -> ServiceResult<bool> {
        let taken: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM applications
                WHERE organization_id = $1 AND name = $2 AND deleted_at IS NULL
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

    async fn check_owner(&self, actor: &Actor, owner_id: Option<Uuid>) -> ServiceResult<()> {
        let Some(owner_id) = owner_id else {
            return Ok(());
        };
        if all_exist_in_organization(&self.pool, "users", "is_active", &[owner_id], actor.organization_id).await? {
            Ok(())
        } else {
            Err(ServiceError::NotFound("Application owner".to_string()))
        }
    }

    pub async fn create(&self, actor: &Actor, input: CreateApplication) -> ServiceResult<Application> {
        let name = input.name.trim().to_string();
        if self.name_taken(actor, &name, None).await? {
            return Err(ServiceError::Conflict(format!(
                "An application with the name '{}' already exists in your organization.",
                name
            )));
        }
        self.check_owner(actor, input.app_owner_id).await?;

        let application = sqlx::query_as::<_, Application>(
            r#"
            INSERT INTO applications (
                id, organization_id, name, description, app_owner_id, application_type,
                hosting_environment, criticality, created_by_id, updated_by_id
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(actor.organization_id)
        .bind(&name)
        .bind(input.description)
        .bind(input.app_owner_id)
        .bind(input.application_type)
        .bind(input.hosting_environment)
        .bind(input.criticality)
        .bind(actor.user_id)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(application_id = %application.id, organization_id = %actor.organization_id, "application created");
        Ok(application)
    }

    pub async fn update(&self, actor: &Actor, id: Uuid, input: UpdateApplication) -> ServiceResult<Application> {
        let mut application = self.get(actor, id).await?;

        if let Some(name) = input.name.as_deref().map(str::trim) {
            if name != application.name && self.name_taken(actor, name, Some(id)).await? {
                return Err(ServiceError::Conflict(format!(
                    "An application with the name '{}' already exists in your organization.",
                    name
                )));
            }
        }
        if let Some(owner) = input.app_owner_id {
            self.check_owner(actor, owner).await?;
        }

        patch(&mut application.name, input.name.map(|n| n.trim().to_string()));
        patch_nullable(&mut application.description, input.description);
        patch_nullable(&mut application.app_owner_id, input.app_owner_id);
        patch_nullable(&mut application.application_type, input.application_type);
        patch_nullable(&mut application.hosting_environment, input.hosting_environment);
        patch_nullable(&mut application.criticality, input.criticality);

        let application = sqlx::query_as::<_, Application>(
            r#"
            UPDATE applications
            SET name = $2, description = $3, app_owner_id = $4, application_type = $5,
                hosting_environment = $6, criticality = $7, updated_by_id = $8, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&application.name)
        .bind(&application.description)
        .bind(application.app_owner_id)
        .bind(&application.application_type)
        .bind(&application.hosting_environment)
        .bind(&application.criticality)
        .bind(actor.user_id)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(application_id = %id, "application updated");
        Ok(application)
    }

    /// Soft delete; a second call returns the already deleted row.
    pub async fn delete(&self, actor: &Actor, id: Uuid) -> ServiceResult<Application> {
        let application = sqlx::query_as::<_, Application>(
            "SELECT * FROM applications WHERE id = $1 AND organization_id = $2",
        )
        .bind(id)
        .bind(actor.organization_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| ServiceError::NotFound("Application".to_string()))?;

        if application.deleted_at.is_some() {
            return Ok(application);
        }

        let application = sqlx::query_as::<_, Application>(
            r#"
            UPDATE applications
            SET is_active = FALSE, deleted_at = NOW(), updated_by_id = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(actor.user_id)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(application_id = %id, "application deleted");
        Ok(application)
    }
}
