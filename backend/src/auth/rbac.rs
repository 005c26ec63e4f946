//! Role-Based Access Control (RBAC) for the BCMS API
//!
//! Roles are organization-scoped rows that bundle named permissions. A request
//! is admitted when the caller's roles cover every required permission, or, for
//! role-gated endpoints, when the caller holds any one of the listed roles.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::middleware::CurrentUser;
use crate::error::{ApiError, ApiResult, AppError};

/// Capability strings stored in the `permissions` table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    OrganizationRead,
    OrganizationUpdate,

    DepartmentCreate,
    DepartmentRead,
    DepartmentUpdate,
    DepartmentDelete,

    UserCreate,
    UserRead,
    UserUpdate,
    UserDelete,

    RoleCreate,
    RoleRead,
    RoleUpdate,
    RoleDelete,
    PermissionRead,

    LocationCreate,
    LocationRead,
    LocationUpdate,
    LocationDelete,

    ApplicationCreate,
    ApplicationRead,
    ApplicationUpdate,
    ApplicationDelete,

    ProcessCreate,
    ProcessRead,
    ProcessUpdate,
    ProcessDelete,

    VendorCreate,
    VendorRead,
    VendorUpdate,
    VendorDelete,

    BiaCategoryCreate,
    BiaCategoryRead,
    BiaCategoryUpdate,
    BiaCategoryDelete,

    // Impact scales and timeframes
    BiaParameterCreate,
    BiaParameterRead,
    BiaParameterUpdate,
    BiaParameterDelete,

    BiaImpactCriterionCreate,
    BiaImpactCriterionRead,
    BiaImpactCriterionUpdate,
    BiaImpactCriterionDelete,
}

impl Permission {
    pub const ALL: &'static [Permission] = &[
        Self::OrganizationRead,
        Self::OrganizationUpdate,
        Self::DepartmentCreate,
        Self::DepartmentRead,
        Self::DepartmentUpdate,
        Self::DepartmentDelete,
        Self::UserCreate,
        Self::UserRead,
        Self::UserUpdate,
        Self::UserDelete,
        Self::RoleCreate,
        Self::RoleRead,
        Self::RoleUpdate,
        Self::RoleDelete,
        Self::PermissionRead,
        Self::LocationCreate,
        Self::LocationRead,
        Self::LocationUpdate,
        Self::LocationDelete,
        Self::ApplicationCreate,
        Self::ApplicationRead,
        Self::ApplicationUpdate,
        Self::ApplicationDelete,
        Self::ProcessCreate,
        Self::ProcessRead,
        Self::ProcessUpdate,
        Self::ProcessDelete,
        Self::VendorCreate,
        Self::VendorRead,
        Self::VendorUpdate,
        Self::VendorDelete,
        Self::BiaCategoryCreate,
        Self::BiaCategoryRead,
        Self::BiaCategoryUpdate,
        Self::BiaCategoryDelete,
        Self::BiaParameterCreate,
        Self::BiaParameterRead,
        Self::BiaParameterUpdate,
        Self::BiaParameterDelete,
        Self::BiaImpactCriterionCreate,
        Self::BiaImpactCriterionRead,
        Self::BiaImpactCriterionUpdate,
        Self::BiaImpactCriterionDelete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OrganizationRead => "organization:read",
            Self::OrganizationUpdate => "organization:update",
            Self::DepartmentCreate => "department:create",
            Self::DepartmentRead => "department:read",
            Self::DepartmentUpdate => "department:update",
            Self::DepartmentDelete => "department:delete",
            Self::UserCreate => "user:create",
            Self::UserRead => "user:read",
            Self::UserUpdate => "user:update",
            Self::UserDelete => "user:delete",
            Self::RoleCreate => "role:create",
            Self::RoleRead => "role:read",
            Self::RoleUpdate => "role:update",
            Self::RoleDelete => "role:delete",
            Self::PermissionRead => "permission:read",
            Self::LocationCreate => "location:create",
            Self::LocationRead => "location:read",
            Self::LocationUpdate => "location:update",
            Self::LocationDelete => "location:delete",
            Self::ApplicationCreate => "application:create",
            Self::ApplicationRead => "application:read",
            Self::ApplicationUpdate => "application:update",
            Self::ApplicationDelete => "application:delete",
            Self::ProcessCreate => "process:create",
            Self::ProcessRead => "process:read",
            Self::ProcessUpdate => "process:update",
            Self::ProcessDelete => "process:delete",
            Self::VendorCreate => "vendor:create",
            Self::VendorRead => "vendor:read",
            Self::VendorUpdate => "vendor:update",
            Self::VendorDelete => "vendor:delete",
            Self::BiaCategoryCreate => "bia_category_create",
            Self::BiaCategoryRead => "bia_category_read",
            Self::BiaCategoryUpdate => "bia_category_update",
            Self::BiaCategoryDelete => "bia_category_delete",
            Self::BiaParameterCreate => "bia_parameter:create",
            Self::BiaParameterRead => "bia_parameter:read",
            Self::BiaParameterUpdate => "bia_parameter:update",
            Self::BiaParameterDelete => "bia_parameter:delete",
            Self::BiaImpactCriterionCreate => "bia_impact_criterion:create",
            Self::BiaImpactCriterionRead => "bia_impact_criterion:read",
            Self::BiaImpactCriterionUpdate => "bia_impact_criterion:update",
            Self::BiaImpactCriterionDelete => "bia_impact_criterion:delete",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|p| p.as_str() == name)
    }

    pub fn is_read(&self) -> bool {
        self.as_str().ends_with("read")
    }

    /// Human-readable description stored alongside the catalog entry
    pub fn description(&self) -> String {
        let name = self.as_str();
        let (resource, action) = name
            .split_once(':')
            .or_else(|| name.rsplit_once('_'))
            .unwrap_or((name, ""));
        format!("Allows {} on {}", action, resource.replace('_', " "))
    }
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Built-in role names, one role row per organization for each
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RoleName {
    SuperAdmin,
    Admin,
    BcmManager,
    Ciso,
    InternalAuditor,
    DepartmentManager,
    User,
}

impl RoleName {
    pub const ALL: &'static [RoleName] = &[
        Self::SuperAdmin,
        Self::Admin,
        Self::BcmManager,
        Self::Ciso,
        Self::InternalAuditor,
        Self::DepartmentManager,
        Self::User,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SuperAdmin => "Super Admin",
            Self::Admin => "Admin",
            Self::BcmManager => "BCM Manager",
            Self::Ciso => "CISO",
            Self::InternalAuditor => "Internal Auditor",
            Self::DepartmentManager => "Department Manager",
            Self::User => "User",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::SuperAdmin => "Unrestricted access across the organization",
            Self::Admin => "Administers users, roles and organization structure",
            Self::BcmManager => "Runs the business continuity program and BIA",
            Self::Ciso => "Oversees security posture, vendors and applications",
            Self::InternalAuditor => "Read-only access for audit purposes",
            Self::DepartmentManager => "Maintains the processes of a department",
            Self::User => "Basic read access",
        }
    }

    /// Permissions granted when the role is seeded
    pub fn default_permissions(&self) -> Vec<Permission> {
        use Permission::*;

        let reads = Permission::ALL.iter().copied().filter(Permission::is_read);

        match self {
            Self::SuperAdmin | Self::Admin => Permission::ALL.to_vec(),
            Self::BcmManager => reads
                .chain([
                    DepartmentCreate,
                    DepartmentUpdate,
                    DepartmentDelete,
                    LocationCreate,
                    LocationUpdate,
                    LocationDelete,
                    ApplicationCreate,
                    ApplicationUpdate,
                    ApplicationDelete,
                    ProcessCreate,
                    ProcessUpdate,
                    ProcessDelete,
                    VendorCreate,
                    VendorUpdate,
                    VendorDelete,
                    BiaCategoryCreate,
                    BiaCategoryUpdate,
                    BiaCategoryDelete,
                    BiaParameterCreate,
                    BiaParameterUpdate,
                    BiaParameterDelete,
                    BiaImpactCriterionCreate,
                    BiaImpactCriterionUpdate,
                    BiaImpactCriterionDelete,
                ])
                .collect(),
            Self::Ciso => reads
                .chain([
                    ApplicationCreate,
                    ApplicationUpdate,
                    ApplicationDelete,
                    VendorCreate,
                    VendorUpdate,
                    VendorDelete,
                ])
                .collect(),
            Self::InternalAuditor => reads.collect(),
            Self::DepartmentManager => reads
                .chain([DepartmentUpdate, ProcessCreate, ProcessUpdate, ProcessDelete])
                .collect(),
            Self::User => vec![
                OrganizationRead,
                DepartmentRead,
                LocationRead,
                ApplicationRead,
                ProcessRead,
                VendorRead,
            ],
        }
    }
}

impl std::fmt::Display for RoleName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Roles allowed to change BIA frameworks
pub const FRAMEWORK_WRITE_ROLES: &[RoleName] =
    &[RoleName::SuperAdmin, RoleName::BcmManager, RoleName::Ciso];

/// Roles allowed to view BIA frameworks
pub const FRAMEWORK_READ_ROLES: &[RoleName] = &[
    RoleName::SuperAdmin,
    RoleName::BcmManager,
    RoleName::Ciso,
    RoleName::DepartmentManager,
    RoleName::InternalAuditor,
];

/// Admit the user only if their roles grant every required permission.
pub fn ensure_user_has_permissions(user: &CurrentUser, required: &[Permission]) -> ApiResult<()> {
    if user.roles.is_empty() {
        return Err(ApiError::forbidden(
            "User has no assigned roles, and therefore no permissions.",
        ));
    }

    let missing = missing_permissions(user, required);
    if missing.is_empty() {
        Ok(())
    } else {
        tracing::debug!(user_id = %user.user.id, ?missing, "permission check failed");
        Err(AppError::InsufficientPermissions { missing })
    }
}

/// Admit the user if they hold any one of the listed roles.
pub fn ensure_user_has_roles(user: &CurrentUser, allowed: &[RoleName]) -> ApiResult<()> {
    if user.roles.is_empty() {
        return Err(ApiError::forbidden("User has no assigned roles."));
    }

    let held: HashSet<&str> = user.roles.iter().map(|r| r.name.as_str()).collect();
    if allowed.iter().any(|role| held.contains(role.as_str())) {
        return Ok(());
    }

    let mut required: Vec<&str> = allowed.iter().map(RoleName::as_str).collect();
    required.sort_unstable();
    required.dedup();
    Err(ApiError::forbidden(format!(
        "User does not have the required roles. Access denied. Required: {}.",
        required.join(", ")
    )))
}

fn missing_permissions(user: &CurrentUser, required: &[Permission]) -> Vec<String> {
    let mut missing: Vec<String> = required
        .iter()
        .filter(|p| !user.has_permission(**p))
        .map(|p| p.as_str().to_string())
        .collect();
    missing.sort();
    missing.dedup();
    missing
}
