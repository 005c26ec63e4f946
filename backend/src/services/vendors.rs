use serde::Deserialize;
use sqlx::PgPool;
use uuid::Uuid;

use super::{fetch_page, patch, patch_nullable, Actor, ServiceError, ServiceResult};
use crate::pagination::{PaginatedResponse, PaginationParams};
use crate::validation::{nullable, patched, Validate, ValidationResult, Validator};
use bcms_shared::{Vendor, VendorCriticality};

pub const SORT_FIELDS: &[&str] = &["name", "criticality", "contact_person", "created_at", "updated_at"];

#[derive(Debug, Clone, Deserialize)]
pub struct CreateVendor {
    pub name: String,
    pub description: Option<String>,
    pub website: Option<String>,
    pub contact_person: Option<String>,
    pub contact_email: Option<String>,
    pub contact_phone: Option<String>,
    pub address: Option<String>,
    pub service_provided: Option<String>,
    #[serde(default)]
    pub criticality: VendorCriticality,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateVendor {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub description: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub website: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub contact_person: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub contact_email: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub contact_phone: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub address: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub service_provided: Option<Option<String>>,
    pub criticality: Option<VendorCriticality>,
}

impl Validate for CreateVendor {
    fn validate(&self) -> ValidationResult<()> {
        Validator::new()
            .name(&self.name, "name", 255)
            .max_length(self.website.as_deref(), "website", 500)
            .max_length(self.contact_person.as_deref(), "contact_person", 255)
            .email(self.contact_email.as_deref(), "contact_email")
            .max_length(self.contact_phone.as_deref(), "contact_phone", 50)
            .max_length(self.address.as_deref(), "address", 500)
            .finish()
    }
}

impl Validate for UpdateVendor {
    fn validate(&self) -> ValidationResult<()> {
        Validator::new()
            .optional_name(self.name.as_deref(), "name", 255)
            .max_length(patched(&self.website), "website", 500)
            .max_length(patched(&self.contact_person), "contact_person", 255)
            .email(patched(&self.contact_email), "contact_email")
            .max_length(patched(&self.contact_phone), "contact_phone", 50)
            .max_length(patched(&self.address), "address", 500)
            .finish()
    }
}

pub struct VendorService {
    pool: PgPool,
}

impl VendorService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn list(&self, actor: &Actor, params: &PaginationParams) -> ServiceResult<PaginatedResponse<Vendor>> {
        fetch_page(&self.pool, "vendors", "is_active", actor.organization_id, params, SORT_FIELDS, "name").await
    }

    /// Any vendor of the organization, active or not
    async fn find(&self, actor: &Actor, id: Uuid) -> ServiceResult<Vendor> {
        sqlx::query_as::<_, Vendor>("SELECT * FROM vendors WHERE id = $1 AND organization_id = $2")
            .bind(id)
            .bind(actor.organization_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Vendor".to_string()))
    }

    pub async fn get(&self, actor: &Actor, id: Uuid) -> ServiceResult<Vendor> {
        let vendor = self.find(actor, id).await?;
        if vendor.is_active {
            Ok(vendor)
        } else {
            Err(ServiceError::NotFound("Vendor".to_string()))
        }
    }

    async fn name_taken(&self, actor: &Actor, name: &str, except: Option<Uuid>) -> ServiceResult<bool> {
        let taken: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM vendors
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
            "A vendor with the name '{}' already exists in your organization.",
            name
        ))
    }

    pub async fn create(&self, actor: &Actor, input: CreateVendor) -> ServiceResult<Vendor> {
        let name = input.name.trim().to_string();
        if self.name_taken(actor, &name, None).await? {
            return Err(Self::duplicate_name(&name));
        }

        let vendor = sqlx::query_as::<_, Vendor>(
            r#"
            INSERT INTO vendors (
                id, organization_id, name, description, website, contact_person, contact_email,
                contact_phone, address, service_provided, criticality, created_by_id, updated_by_id
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $12)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(actor.organization_id)
        .bind(&name)
        .bind(input.description)
        .bind(input.website)
        .bind(input.contact_person)
        .bind(input.contact_email)
        .bind(input.contact_phone)
        .bind(input.address)
        .bind(input.service_provided)
        .bind(input.criticality)
        .bind(actor.user_id)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(vendor_id = %vendor.id, organization_id = %actor.organization_id, "vendor created");
        Ok(vendor)
    }

    pub async fn update(&self, actor: &Actor, id: Uuid, input: UpdateVendor) -> ServiceResult<Vendor> {
        let mut vendor = self.find(actor, id).await?;
        if !vendor.is_active {
            return Err(ServiceError::Unprocessable(format!(
                "Vendor with ID {} is inactive and cannot be updated.",
                id
            )));
        }

        if let Some(name) = input.name.as_deref().map(str::trim) {
            if name != vendor.name && self.name_taken(actor, name, Some(id)).await? {
                return Err(Self::duplicate_name(name));
            }
        }

        patch(&mut vendor.name, input.name.map(|n| n.trim().to_string()));
        patch(&mut vendor.criticality, input.criticality);
        patch_nullable(&mut vendor.description, input.description);
        patch_nullable(&mut vendor.website, input.website);
        patch_nullable(&mut vendor.contact_person, input.contact_person);
        patch_nullable(&mut vendor.contact_email, input.contact_email);
        patch_nullable(&mut vendor.contact_phone, input.contact_phone);
        patch_nullable(&mut vendor.address, input.address);
        patch_nullable(&mut vendor.service_provided, input.service_provided);

        let vendor = sqlx::query_as::<_, Vendor>(
            r#"
            UPDATE vendors
            SET name = $2, description = $3, website = $4, contact_person = $5, contact_email = $6,
                contact_phone = $7, address = $8, service_provided = $9, criticality = $10,
                updated_by_id = $11, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&vendor.name)
        .bind(&vendor.description)
        .bind(&vendor.website)
        .bind(&vendor.contact_person)
        .bind(&vendor.contact_email)
        .bind(&vendor.contact_phone)
        .bind(&vendor.address)
        .bind(&vendor.service_provided)
        .bind(vendor.criticality)
        .bind(actor.user_id)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(vendor_id = %id, "vendor updated");
        Ok(vendor)
    }

    /// Deactivates the vendor; an inactive vendor is returned as is.
    pub async fn delete(&self, actor: &Actor, id: Uuid) -> ServiceResult<Vendor> {
        let vendor = self.find(actor, id).await?;
        if !vendor.is_active {
            return Ok(vendor);
        }

        let vendor = sqlx::query_as::<_, Vendor>(
            r#"
            UPDATE vendors
            SET is_active = FALSE, updated_by_id = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(actor.user_id)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(vendor_id = %id, "vendor deactivated");
        Ok(vendor)
    }
}
