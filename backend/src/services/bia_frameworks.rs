use serde::Deserialize;
use sqlx::{PgPool, Postgres, Transaction};
use std::collections::HashMap;
use uuid::Uuid;

use super::{all_exist_in_organization, fetch_page, patch, patch_nullable, Actor, ServiceError, ServiceResult};
use crate::pagination::{PaginatedResponse, PaginationParams};
use crate::validation::{nullable, Validate, ValidationResult, Validator};
use bcms_shared::{BiaFramework, BiaFrameworkDetail, BiaFrameworkParameter, BiaFrameworkRto, FrameworkFormula};

pub const SORT_FIELDS: &[&str] = &["name", "threshold", "created_at", "updated_at"];

const WEIGHTAGE_TOLERANCE: f64 = 0.01;

#[derive(Debug, Clone, Deserialize)]
pub struct ParameterInput {
    pub criterion_id: Uuid,
    pub weightage: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RtoInput {
    pub display_text: String,
    pub value_in_hours: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateFramework {
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub formula: FrameworkFormula,
    pub threshold: f64,
    pub parameters: Vec<ParameterInput>,
    pub rtos: Vec<RtoInput>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateFramework {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub description: Option<Option<String>>,
    pub formula: Option<FrameworkFormula>,
    pub threshold: Option<f64>,
    pub parameters: Option<Vec<ParameterInput>>,
    pub rtos: Option<Vec<RtoInput>>,
}

/// Weightages must add up to 100, give or take rounding.
pub fn weightages_sum_to_hundred(parameters: &[ParameterInput]) -> bool {
    let total: f64 = parameters.iter().map(|p| p.weightage).sum();
    (total - 100.0).abs() <= WEIGHTAGE_TOLERANCE
}

fn validate_parameters(mut validator: Validator, parameters: &[ParameterInput]) -> Validator {
    for (i, parameter) in parameters.iter().enumerate() {
        validator = validator.error_if(
            !(parameter.weightage > 0.0 && parameter.weightage <= 100.0),
            &format!("parameters[{}].weightage", i),
            "Weightage must be greater than 0 and at most 100",
        );
    }
    validator.error_if(
        !weightages_sum_to_hundred(parameters),
        "parameters",
        "The sum of all parameter weightages must be 100.",
    )
}

fn validate_rtos(mut validator: Validator, rtos: &[RtoInput]) -> Validator {
    for (i, rto) in rtos.iter().enumerate() {
        validator = validator.name(&rto.display_text, &format!("rtos[{}].display_text", i), 100);
    }
    validator
}

impl Validate for CreateFramework {
    fn validate(&self) -> ValidationResult<()> {
        let validator = Validator::new().name(&self.name, "name", 255);
        let validator = validate_parameters(validator, &self.parameters);
        validate_rtos(validator, &self.rtos).finish()
    }
}

impl Validate for UpdateFramework {
    fn validate(&self) -> ValidationResult<()> {
        let mut validator = Validator::new().optional_name(self.name.as_deref(), "name", 255);
        if let Some(parameters) = &self.parameters {
            validator = validate_parameters(validator, parameters);
        }
        validate_rtos(validator, self.rtos.as_deref().unwrap_or_default()).finish()
    }
}

pub struct BiaFrameworkService {
    pool: PgPool,
}

impl BiaFrameworkService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn details(&self, frameworks: Vec<BiaFramework>) -> ServiceResult<Vec<BiaFrameworkDetail>> {
        let ids: Vec<Uuid> = frameworks.iter().map(|f| f.id).collect();

        let parameters = sqlx::query_as::<_, BiaFrameworkParameter>(
            "SELECT * FROM bia_framework_parameters WHERE framework_id = ANY($1) ORDER BY weightage DESC, id",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let rtos = sqlx::query_as::<_, BiaFrameworkRto>(
            "SELECT * FROM bia_framework_rtos WHERE framework_id = ANY($1) ORDER BY value_in_hours, id",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut parameters_by_framework: HashMap<Uuid, Vec<BiaFrameworkParameter>> = HashMap::new();
        for parameter in parameters {
            parameters_by_framework.entry(parameter.framework_id).or_default().push(parameter);
        }
        let mut rtos_by_framework: HashMap<Uuid, Vec<BiaFrameworkRto>> = HashMap::new();
        for rto in rtos {
            rtos_by_framework.entry(rto.framework_id).or_default().push(rto);
        }

        Ok(frameworks
            .into_iter()
            .map(|framework| BiaFrameworkDetail {
                parameters: parameters_by_framework.remove(&framework.id).unwrap_or_default(),
                rtos: rtos_by_framework.remove(&framework.id).unwrap_or_default(),
                framework,
            })
            .collect())
    }

    async fn detail(&self, framework: BiaFramework) -> ServiceResult<BiaFrameworkDetail> {
        self.details(vec![framework])
            .await?
            .pop()
            .ok_or_else(|| ServiceError::NotFound("BIA framework".to_string()))
    }

    pub async fn list(
        &self,
        actor: &Actor,
        params: &PaginationParams,
    ) -> ServiceResult<PaginatedResponse<BiaFrameworkDetail>> {
        let page = fetch_page::<BiaFramework>(
            &self.pool,
            "bia_frameworks",
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

    async fn find_live(&self, actor: &Actor, id: Uuid) -> ServiceResult<BiaFramework> {
        sqlx::query_as::<_, BiaFramework>(
            "SELECT * FROM bia_frameworks WHERE id = $1 AND organization_id = $2 AND is_active",
        )
        .bind(id)
        .bind(actor.organization_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| ServiceError::NotFound("BIA framework".to_string()))
    }

    pub async fn get(&self, actor: &Actor, id: Uuid) -> ServiceResult<BiaFrameworkDetail> {
        let framework = self.find_live(actor, id).await?;
        self.detail(framework).await
    }

    async fn name_taken(&self, actor: &Actor, name: &str, except: Option<Uuid>) -> ServiceResult<bool> {
        let taken: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM bia_frameworks
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

    fn duplicate_name(name: &str) -> ServiceError {
        ServiceError::Conflict(format!(
            "A BIA framework with the name '{}' already exists in this organization.",
            name
        ))
    }

    async fn check_criteria(&self, actor: &Actor, parameters: &[ParameterInput]) -> ServiceResult<()> {
        let ids: Vec<Uuid> = parameters.iter().map(|p| p.criterion_id).collect();
        if all_exist_in_organization(&self.pool, "bia_impact_criteria", "is_active", &ids, actor.organization_id)
            .await?
        {
            Ok(())
        } else {
            Err(ServiceError::NotFound("One or more impact criteria".to_string()))
        }
    }

    async fn replace_parameters(
        tx: &mut Transaction<'_, Postgres>,
        framework_id: Uuid,
        parameters: &[ParameterInput],
    ) -> ServiceResult<()> {
        sqlx::query("DELETE FROM bia_framework_parameters WHERE framework_id = $1")
            .bind(framework_id)
            .execute(&mut **tx)
            .await?;
        for parameter in parameters {
            sqlx::query(
                "INSERT INTO bia_framework_parameters (id, framework_id, criterion_id, weightage) VALUES ($1, $2, $3, $4)",
            )
            .bind(Uuid::new_v4())
            .bind(framework_id)
            .bind(parameter.criterion_id)
            .bind(parameter.weightage)
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }

    async fn replace_rtos(
        tx: &mut Transaction<'_, Postgres>,
        framework_id: Uuid,
        rtos: &[RtoInput],
    ) -> ServiceResult<()> {
        sqlx::query("DELETE FROM bia_framework_rtos WHERE framework_id = $1")
            .bind(framework_id)
            .execute(&mut **tx)
            .await?;
        for rto in rtos {
            sqlx::query(
                "INSERT INTO bia_framework_rtos (id, framework_id, display_text, value_in_hours) VALUES ($1, $2, $3, $4)",
            )
            .bind(Uuid::new_v4())
            .bind(framework_id)
            .bind(rto.display_text.trim())
            .bind(rto.value_in_hours)
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }

    pub async fn create(&self, actor: &Actor, input: CreateFramework) -> ServiceResult<BiaFrameworkDetail> {
        let name = input.name.trim().to_string();
        if self.name_taken(actor, &name, None).await? {
            return Err(Self::duplicate_name(&name));
        }
        self.check_criteria(actor, &input.parameters).await?;

        let mut tx = self.pool.begin().await?;

        let framework = sqlx::query_as::<_, BiaFramework>(
            r#"
            INSERT INTO bia_frameworks (
                id, organization_id, name, description, formula, threshold, created_by_id, updated_by_id
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $7)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(actor.organization_id)
        .bind(&name)
        .bind(&input.description)
        .bind(input.formula)
        .bind(input.threshold)
        .bind(actor.user_id)
        .fetch_one(&mut *tx)
        .await?;

        Self::replace_parameters(&mut tx, framework.id, &input.parameters).await?;
        Self::replace_rtos(&mut tx, framework.id, &input.rtos).await?;
        tx.commit().await?;

        tracing::info!(
            framework_id = %framework.id,
            parameters = input.parameters.len(),
            rtos = input.rtos.len(),
            "bia framework created"
        );
        self.detail(framework).await
    }

    /// Updates the framework; given parameters and RTOs replace the current ones wholesale.
    pub async fn update(&self, actor: &Actor, id: Uuid, input: UpdateFramework) -> ServiceResult<BiaFrameworkDetail> {
        let mut framework = self.find_live(actor, id).await?;

        if let Some(name) = input.name.as_deref().map(str::trim) {
            if name != framework.name && self.name_taken(actor, name, Some(id)).await? {
                return Err(Self::duplicate_name(name));
            }
        }
        if let Some(parameters) = &input.parameters {
            self.check_criteria(actor, parameters).await?;
        }

        patch(&mut framework.name, input.name.map(|n| n.trim().to_string()));
        patch(&mut framework.formula, input.formula);
        patch(&mut framework.threshold, input.threshold);
        patch_nullable(&mut framework.description, input.description);

        let mut tx = self.pool.begin().await?;

        let framework = sqlx::query_as::<_, BiaFramework>(
            r#"
            UPDATE bia_frameworks
            SET name = $2, description = $3, formula = $4, threshold = $5,
                updated_by_id = $6, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&framework.name)
        .bind(&framework.description)
        .bind(framework.formula)
        .bind(framework.threshold)
        .bind(actor.user_id)
        .fetch_one(&mut *tx)
        .await?;

        if let Some(parameters) = &input.parameters {
            Self::replace_parameters(&mut tx, id, parameters).await?;
        }
        if let Some(rtos) = &input.rtos {
            Self::replace_rtos(&mut tx, id, rtos).await?;
        }
        tx.commit().await?;

        tracing::info!(framework_id = %id, "bia framework updated");
        self.detail(framework).await
    }

    /// Soft delete; a second call returns the already inactive row.
    pub async fn delete(&self, actor: &Actor, id: Uuid) -> ServiceResult<BiaFrameworkDetail> {
        let framework = sqlx::query_as::<_, BiaFramework>(
            "SELECT * FROM bia_frameworks WHERE id = $1 AND organization_id = $2",
        )
        .bind(id)
        .bind(actor.organization_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| ServiceError::NotFound("BIA framework".to_string()))?;

        if !framework.is_active {
            return self.detail(framework).await;
        }

        let framework = sqlx::query_as::<_, BiaFramework>(
            r#"
            UPDATE bia_frameworks
            SET is_active = FALSE, updated_by_id = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(actor.user_id)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(framework_id = %id, "bia framework deleted");
        self.detail(framework).await
    }
}
