use std::collections::HashSet;

use crate::auth::rbac::{FRAMEWORK_READ_ROLES, FRAMEWORK_WRITE_ROLES};
use crate::auth::{Permission, RoleName};

#[test]
fn test_role_names_are_unique_and_described() {
    let names: HashSet<&str> = RoleName::ALL.iter().map(RoleName::as_str).collect();
    assert_eq!(names.len(), RoleName::ALL.len());
    assert!(RoleName::ALL.iter().all(|role| !role.description().is_empty()));
}

#[test]
fn test_framework_writers_can_also_read() {
    for role in FRAMEWORK_WRITE_ROLES {
        assert!(FRAMEWORK_READ_ROLES.contains(role), "{} cannot read frameworks", role);
    }
    assert!(!FRAMEWORK_READ_ROLES.contains(&RoleName::User));
}

#[test]
fn test_bundles_only_reference_catalog_permissions() {
    let catalog: HashSet<Permission> = Permission::ALL.iter().copied().collect();
    for role in RoleName::ALL {
        let bundle = role.default_permissions();
        assert!(bundle.iter().all(|p| catalog.contains(p)), "{} has unknown permission", role);

        let unique: HashSet<Permission> = bundle.iter().copied().collect();
        assert_eq!(unique.len(), bundle.len(), "{} repeats a permission", role);
    }
}

#[test]
fn test_basic_user_cannot_write() {
    let bundle = RoleName::User.default_permissions();
    assert!(bundle.iter().all(Permission::is_read));
    assert!(!bundle.contains(&Permission::UserRead));
}

#[test]
fn test_ciso_manages_vendors_but_not_processes() {
    let bundle = RoleName::Ciso.default_permissions();
    assert!(bundle.contains(&Permission::VendorCreate));
    assert!(bundle.contains(&Permission::ApplicationDelete));
    assert!(!bundle.contains(&Permission::ProcessCreate));
}
