//! Idempotent bootstrap of the default tenant
//!
//! Creates the default organization, the global permission catalog, one system
//! role per [`RoleName`] with its default permission bundle, and optionally the
//! first superuser. Rows that already exist are left untouched, so the command
//! is safe to run on every deploy.

use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::auth::{hash_password, Permission, RoleName};
use crate::config::SeedConfig;

#[derive(Debug, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub organization_created: bool,
    pub permissions_created: u64,
    pub roles_created: u64,
    pub superuser_created: bool,
}

pub async fn run(pool: &PgPool, config: &SeedConfig) -> anyhow::Result<SeedReport> {
    let mut report = SeedReport::default();
    let mut tx = pool.begin().await?;

    report.organization_created = sqlx::query(
        "INSERT INTO organizations (id, name) VALUES ($1, $2) ON CONFLICT DO NOTHING",
    )
    .bind(config.default_organization_id)
    .bind(&config.default_organization_name)
    .execute(&mut *tx)
    .await?
    .rows_affected()
        > 0;

    for permission in Permission::ALL {
        report.permissions_created += sqlx::query(
            "INSERT INTO permissions (id, name, description) VALUES ($1, $2, $3) ON CONFLICT (name) DO NOTHING",
        )
        .bind(Uuid::new_v4())
        .bind(permission.as_str())
        .bind(permission.description())
        .execute(&mut *tx)
        .await?
        .rows_affected();
    }

    for role in RoleName::ALL {
        if seed_role(&mut tx, config.default_organization_id, *role).await? {
            report.roles_created += 1;
        }
    }

    if let (Some(email), Some(password)) = (
        config.first_superuser_email.as_deref(),
        config.first_superuser_password.as_deref(),
    ) {
        report.superuser_created =
            seed_superuser(&mut tx, config.default_organization_id, email, password).await?;
    } else {
        tracing::warn!("FIRST_SUPERUSER_EMAIL/FIRST_SUPERUSER_PASSWORD not set, skipping superuser");
    }

    tx.commit().await?;

    tracing::info!(
        organization_created = report.organization_created,
        permissions_created = report.permissions_created,
        roles_created = report.roles_created,
        superuser_created = report.superuser_created,
        "seed completed"
    );
    Ok(report)
}

/// Returns whether the role was newly created. Existing roles keep their permissions.
async fn seed_role(
    tx: &mut Transaction<'_, Postgres>,
    organization_id: Uuid,
    role: RoleName,
) -> anyhow::Result<bool> {
    let created: Option<Uuid> = sqlx::query_scalar(
        r#"
        INSERT INTO roles (id, organization_id, name, description, is_system_role)
        VALUES ($1, $2, $3, $4, TRUE)
        ON CONFLICT (organization_id, name) DO NOTHING
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(organization_id)
    .bind(role.as_str())
    .bind(role.description())
    .fetch_optional(&mut **tx)
    .await?;

    let Some(role_id) = created else {
        return Ok(false);
    };

    let names: Vec<&str> = role.default_permissions().iter().map(Permission::as_str).collect();
    sqlx::query(
        r#"
        INSERT INTO role_permissions (role_id, permission_id)
        SELECT $1, id FROM permissions WHERE name = ANY($2)
        "#,
    )
    .bind(role_id)
    .bind(&names)
    .execute(&mut **tx)
    .await?;

    Ok(true)
}

async fn seed_superuser(
    tx: &mut Transaction<'_, Postgres>,
    organization_id: Uuid,
    email: &str,
    password: &str,
) -> anyhow::Result<bool> {
    let email = email.trim().to_lowercase();
    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM users WHERE organization_id = $1 AND email = $2)",
    )
    .bind(organization_id)
    .bind(&email)
    .fetch_one(&mut **tx)
    .await?;
    if exists {
        return Ok(false);
    }

    let password_hash = hash_password(password).map_err(|e| anyhow::anyhow!("{}", e))?;
    let user_id = Uuid::new_v4();

    sqlx::query(
        r#"
        INSERT INTO users (id, organization_id, first_name, last_name, email, password_hash)
        VALUES ($1, $2, 'Super', 'Admin', $3, $4)
        "#,
    )
    .bind(user_id)
    .bind(organization_id)
    .bind(&email)
    .bind(&password_hash)
    .execute(&mut **tx)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO user_roles (user_id, role_id)
        SELECT $1, id FROM roles WHERE organization_id = $2 AND name = $3
        "#,
    )
    .bind(user_id)
    .bind(organization_id)
    .bind(RoleName::SuperAdmin.as_str())
    .execute(&mut **tx)
    .await?;

    tracing::info!(user_id = %user_id, "superuser created");
    Ok(true)
}
