use serde::Deserialize;
use sqlx::PgPool;

use super::{patch, patch_nullable, Actor, ServiceError, ServiceResult};
use crate::validation::{nullable, patched, Validate, ValidationResult, Validator};
use bcms_shared::Organization;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateOrganization {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub description: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub industry: Option<Option<String>>,
}

impl Validate for UpdateOrganization {
    fn validate(&self) -> ValidationResult<()> {
        Validator::new()
            .optional_name(self.name.as_deref(), "name", 255)
            .max_length(patched(&self.industry), "industry", 100)
            .finish()
    }
}

pub struct OrganizationService {
    pool: PgPool,
}

impl OrganizationService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The caller's own organization
    pub async fn current(&self, actor: &Actor) -> ServiceResult<Organization> {
        sqlx::query_as::<_, Organization>("SELECT * FROM organizations WHERE id = $1")
            .bind(actor.organization_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Organization".to_string()))
    }

    pub async fn update_current(
        &self,
        actor: &Actor,
        input: UpdateOrganization,
    ) -> ServiceResult<Organization> {
        let mut organization = self.current(actor).await?;

        if let Some(name) = input.name.as_deref().map(str::trim) {
            let taken: bool = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM organizations WHERE name = $1 AND id <> $2)",
            )
            .bind(name)
            .bind(organization.id)
            .fetch_one(&self.pool)
            .await?;
            if taken {
                return Err(ServiceError::Conflict(format!(
                    "An organization with the name '{}' already exists.",
                    name
                )));
            }
        }

        patch(&mut organization.name, input.name.map(|n| n.trim().to_string()));
        patch_nullable(&mut organization.description, input.description);
        patch_nullable(&mut organization.industry, input.industry);

        let organization = sqlx::query_as::<_, Organization>(
            r#"
            UPDATE organizations
            SET name = $2, description = $3, industry = $4, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(organization.id)
        .bind(&organization.name)
        .bind(&organization.description)
        .bind(&organization.industry)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(organization_id = %organization.id, "organization updated");
        Ok(organization)
    }
}
