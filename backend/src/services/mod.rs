//! Organization-scoped business services
//!
//! Every service takes the caller's [`Actor`] and filters by its organization, so
//! a record owned by another tenant is indistinguishable from a missing one.

pub mod applications;
pub mod bia_categories;
pub mod bia_frameworks;
pub mod bia_impact_criteria;
pub mod bia_impact_scales;
pub mod bia_timeframes;
pub mod departments;
pub mod locations;
pub mod organizations;
pub mod processes;
pub mod roles;
pub mod users;
pub mod vendors;

use sqlx::{postgres::PgRow, FromRow, PgPool, Postgres, Transaction};
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::AppError;
use crate::pagination::{PaginatedResponse, PaginationParams};
use bcms_shared::{
    Audited, BiaCategory, BiaImpactCriterion, BiaImpactCriterionLevel, BiaImpactScale,
    BiaImpactScaleLevel, BiaTimeframe, UserSummary,
};

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Unprocessable(String),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Password hashing error")]
    PasswordHash(#[from] argon2::password_hash::Error),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::NotFound(what) => AppError::NotFound(what),
            ServiceError::BadRequest(msg) => AppError::BadRequest(msg),
            ServiceError::Conflict(msg) => AppError::Conflict(msg),
            ServiceError::Unprocessable(msg) => AppError::Unprocessable(msg),
            ServiceError::Database(e) => AppError::from(e),
            err @ ServiceError::PasswordHash(_) => AppError::InternalError(err.to_string()),
        }
    }
}

/// The authenticated caller as seen by the service layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub user_id: Uuid,
    pub organization_id: Uuid,
}

/// Overwrite `target` when the patch carries a value.
pub fn patch<T>(target: &mut T, value: Option<T>) {
    if let Some(v) = value {
        *target = v;
    }
}

/// Same as [`patch`] for nullable columns, where `Some(None)` clears the value.
pub fn patch_nullable<T>(target: &mut Option<T>, value: Option<Option<T>>) {
    if let Some(v) = value {
        *target = v;
    }
}

/// Deduplicate ids, keeping first-seen order.
pub fn unique_ids(ids: &[Uuid]) -> Vec<Uuid> {
    let mut seen = std::collections::HashSet::with_capacity(ids.len());
    ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}

/// Check that every id matches a row of `table` in the organization.
///
/// `table` and `filter` are compile-time identifiers, never user input.
pub(crate) async fn all_exist_in_organization(
    pool: &PgPool,
    table: &str,
    filter: &str,
    ids: &[Uuid],
    organization_id: Uuid,
) -> ServiceResult<bool> {
    let ids = unique_ids(ids);
    if ids.is_empty() {
        return Ok(true);
    }

    let sql = format!(
        "SELECT COUNT(*) FROM {} WHERE id = ANY($1) AND organization_id = $2 AND {}",
        table, filter
    );
    let found: i64 = sqlx::query_scalar(&sql)
        .bind(&ids)
        .bind(organization_id)
        .fetch_one(pool)
        .await?;

    Ok(found as usize == ids.len())
}

/// Replace every `(owner, member)` row of a link table for one owner.
pub(crate) async fn replace_links(
    tx: &mut Transaction<'_, Postgres>,
    table: &str,
    owner_column: &str,
    owner_id: Uuid,
    member_column: &str,
    members: &[Uuid],
) -> ServiceResult<()> {
    sqlx::query(&format!("DELETE FROM {} WHERE {} = $1", table, owner_column))
        .bind(owner_id)
        .execute(&mut **tx)
        .await?;

    let members = unique_ids(members);
    if !members.is_empty() {
        sqlx::query(&format!(
            "INSERT INTO {} ({}, {}) SELECT $1, UNNEST($2::uuid[])",
            table, owner_column, member_column
        ))
        .bind(owner_id)
        .bind(&members)
        .execute(&mut **tx)
        .await?;
    }

    Ok(())
}

/// Paginated `SELECT *` over one organization's live rows.
pub(crate) async fn fetch_page<T>(
    pool: &PgPool,
    table: &str,
    live_filter: &str,
    organization_id: Uuid,
    params: &PaginationParams,
    sort_fields: &[&str],
    default_sort: &str,
) -> ServiceResult<PaginatedResponse<T>>
where
    T: for<'r> FromRow<'r, PgRow> + Send + Unpin,
{
    let total: i64 = sqlx::query_scalar(&format!(
        "SELECT COUNT(*) FROM {} WHERE organization_id = $1 AND {}",
        table, live_filter
    ))
    .bind(organization_id)
    .fetch_one(pool)
    .await?;

    let rows = sqlx::query_as::<_, T>(&format!(
        "SELECT * FROM {} WHERE organization_id = $1 AND {} ORDER BY {}, id LIMIT $2 OFFSET $3",
        table,
        live_filter,
        params.order_clause(sort_fields, default_sort)
    ))
    .bind(organization_id)
    .bind(params.limit())
    .bind(params.offset())
    .fetch_all(pool)
    .await?;

    Ok(PaginatedResponse::new(rows, params, total))
}

/// Records carrying `created_by_id`/`updated_by_id` audit pointers
pub trait AuditTrail {
    fn created_by_id(&self) -> Option<Uuid>;
    fn updated_by_id(&self) -> Option<Uuid>;
}

macro_rules! impl_audit_trail {
    ($($ty:ty),* $(,)?) => {
        $(impl AuditTrail for $ty {
            fn created_by_id(&self) -> Option<Uuid> {
                self.created_by_id
            }
            fn updated_by_id(&self) -> Option<Uuid> {
                self.updated_by_id
            }
        })*
    };
}

impl_audit_trail!(
    BiaCategory,
    BiaImpactScale,
    BiaImpactScaleLevel,
    BiaTimeframe,
    BiaImpactCriterion,
    BiaImpactCriterionLevel,
);

/// Resolves audit user references in one round trip per batch of records.
#[derive(Debug, Default)]
pub struct AuditUsers {
    users: HashMap<Uuid, UserSummary>,
}

impl AuditUsers {
    pub async fn load<'a, T, I>(pool: &PgPool, records: I) -> ServiceResult<Self>
    where
        T: AuditTrail + 'a,
        I: IntoIterator<Item = &'a T>,
    {
        let ids: Vec<Uuid> = records
            .into_iter()
            .flat_map(|r| [r.created_by_id(), r.updated_by_id()])
            .flatten()
            .collect();
        Self::load_ids(pool, &ids).await
    }

    pub async fn load_ids(pool: &PgPool, ids: &[Uuid]) -> ServiceResult<Self> {
        let ids = unique_ids(ids);
        if ids.is_empty() {
            return Ok(Self::default());
        }

        let rows = sqlx::query_as::<_, UserSummary>(
            "SELECT id, first_name, last_name, email FROM users WHERE id = ANY($1)",
        )
        .bind(&ids)
        .fetch_all(pool)
        .await?;

        Ok(Self {
            users: rows.into_iter().map(|u| (u.id, u)).collect(),
        })
    }

    pub fn attach<T: AuditTrail>(&self, record: T) -> Audited<T> {
        let lookup = |id: Option<Uuid>| id.and_then(|id| self.users.get(&id).cloned());
        Audited {
            created_by: lookup(record.created_by_id()),
            updated_by: lookup(record.updated_by_id()),
            record,
        }
    }
}
