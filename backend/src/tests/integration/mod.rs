pub mod api_auth;
pub mod api_bia;
pub mod api_org_structure;
pub mod api_rbac;
pub mod api_vendors;
