use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ==================== Tenancy & Access ====================

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Organization {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub industry: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub job_title: Option<String>,
    pub department_id: Option<Uuid>,
    pub location_id: Option<Uuid>,
    pub is_active: bool,
    pub created_by_id: Option<Uuid>,
    pub updated_by_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Compact user reference embedded in audited records.
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Role {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub is_system_role: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Permission {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleWithPermissions {
    #[serde(flatten)]
    pub role: Role,
    pub permissions: Vec<Permission>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserWithRoles {
    #[serde(flatten)]
    pub user: User,
    pub roles: Vec<Role>,
}

// ==================== Organization Structure ====================

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Location {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub name: String,
    pub address_line1: Option<String>,
    pub address_line2: Option<String>,
    pub city: Option<String>,
    pub state_province: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
    pub is_active: bool,
    pub created_by_id: Option<Uuid>,
    pub updated_by_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Department {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub department_head_id: Option<Uuid>,
    pub number_of_team_members: Option<i32>,
    pub is_active: bool,
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_by_id: Option<Uuid>,
    pub updated_by_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepartmentDetail {
    #[serde(flatten)]
    pub department: Department,
    pub locations: Vec<Location>,
}

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Application {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub app_owner_id: Option<Uuid>,
    pub application_type: Option<String>,
    pub hosting_environment: Option<String>,
    pub criticality: Option<String>,
    pub is_active: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_by_id: Option<Uuid>,
    pub updated_by_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ==================== Business Processes ====================

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Process {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub department_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub sla: Option<String>,
    pub tat: Option<String>,
    pub seasonality: Option<String>,
    pub peak_times: Option<String>,
    pub frequency: Option<String>,
    pub number_of_team_members: Option<i32>,
    pub rto: Option<f64>,
    pub rpo: Option<f64>,
    pub criticality_level: Option<String>,
    pub process_owner_id: Option<Uuid>,
    pub is_active: bool,
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_by_id: Option<Uuid>,
    pub updated_by_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessSummary {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessDetail {
    #[serde(flatten)]
    pub process: Process,
    pub locations: Vec<Location>,
    pub applications: Vec<Application>,
    pub upstream_dependencies: Vec<ProcessSummary>,
    pub downstream_dependencies: Vec<ProcessSummary>,
}

// ==================== Third Parties ====================

#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "vendor_criticality", rename_all = "SCREAMING_SNAKE_CASE"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VendorCriticality {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vendor {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub website: Option<String>,
    pub contact_person: Option<String>,
    pub contact_email: Option<String>,
    pub contact_phone: Option<String>,
    pub address: Option<String>,
    pub service_provided: Option<String>,
    pub criticality: VendorCriticality,
    pub is_active: bool,
    pub created_by_id: Option<Uuid>,
    pub updated_by_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ==================== Business Impact Analysis ====================

/// A record together with the users who created and last changed it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Audited<T> {
    #[serde(flatten)]
    pub record: T,
    pub created_by: Option<UserSummary>,
    pub updated_by: Option<UserSummary>,
}

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BiaCategory {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub created_by_id: Option<Uuid>,
    pub updated_by_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BiaImpactScale {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub scale_name: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_by_id: Option<Uuid>,
    pub updated_by_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BiaImpactScaleLevel {
    pub id: Uuid,
    pub impact_scale_id: Uuid,
    pub level_value: i32,
    pub level_name: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_by_id: Option<Uuid>,
    pub updated_by_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BiaImpactScaleDetail {
    #[serde(flatten)]
    pub scale: Audited<BiaImpactScale>,
    pub levels: Vec<Audited<BiaImpactScaleLevel>>,
}

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BiaTimeframe {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub timeframe_name: String,
    pub sequence_order: i32,
    pub description: Option<String>,
    pub is_active: bool,
    pub created_by_id: Option<Uuid>,
    pub updated_by_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "rating_type", rename_all = "SCREAMING_SNAKE_CASE"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RatingType {
    Qualitative,
    Quantitative,
}

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BiaImpactCriterion {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub bia_category_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub rating_type: RatingType,
    pub is_active: bool,
    pub created_by_id: Option<Uuid>,
    pub updated_by_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BiaImpactCriterionLevel {
    pub id: Uuid,
    pub bia_impact_criterion_id: Uuid,
    pub organization_id: Uuid,
    pub level_name: Option<String>,
    pub level_value_min: Option<f64>,
    pub level_value_max: Option<f64>,
    pub quantitative_level_descriptor: Option<String>,
    pub score: i32,
    pub sequence_order: i32,
    pub is_active: bool,
    pub created_by_id: Option<Uuid>,
    pub updated_by_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BiaImpactCriterionDetail {
    #[serde(flatten)]
    pub criterion: Audited<BiaImpactCriterion>,
    pub levels: Vec<Audited<BiaImpactCriterionLevel>>,
}

#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "framework_formula", rename_all = "SCREAMING_SNAKE_CASE"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FrameworkFormula {
    #[default]
    WeightedAverage,
}

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BiaFramework {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub formula: FrameworkFormula,
    pub threshold: f64,
    pub is_active: bool,
    pub created_by_id: Option<Uuid>,
    pub updated_by_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BiaFrameworkParameter {
    pub id: Uuid,
    pub framework_id: Uuid,
    pub criterion_id: Uuid,
    pub weightage: f64,
}

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BiaFrameworkRto {
    pub id: Uuid,
    pub framework_id: Uuid,
    pub display_text: String,
    pub value_in_hours: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BiaFrameworkDetail {
    #[serde(flatten)]
    pub framework: BiaFramework,
    pub parameters: Vec<BiaFrameworkParameter>,
    pub rtos: Vec<BiaFrameworkRto>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vendor_criticality_defaults_to_medium() {
        assert_eq!(VendorCriticality::default(), VendorCriticality::Medium);
        assert_eq!(
            serde_json::to_value(VendorCriticality::Critical).unwrap(),
            serde_json::json!("CRITICAL")
        );
    }

    #[test]
    fn password_hash_is_never_serialized() {
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            organization_id: Uuid::new_v4(),
            first_name: "Ada".into(),
            last_name: "Lovelace".into(),
            email: "ada@example.com".into(),
            password_hash: "$argon2id$secret".into(),
            job_title: None,
            department_id: None,
            location_id: None,
            is_active: true,
            created_by_id: None,
            updated_by_id: None,
            created_at: now,
            updated_at: now,
        };
        let value = serde_json::to_value(&user).unwrap();
        assert!(value.get("password_hash").is_none());
        assert_eq!(value["email"], "ada@example.com");
    }

    #[test]
    fn audited_flattens_the_record() {
        let now = Utc::now();
        let category = BiaCategory {
            id: Uuid::new_v4(),
            organization_id: Uuid::new_v4(),
            name: "Financial".into(),
            description: None,
            is_active: true,
            created_by_id: None,
            updated_by_id: None,
            created_at: now,
            updated_at: now,
        };
        let audited = Audited { record: category, created_by: None, updated_by: None };
        let value = serde_json::to_value(&audited).unwrap();
        assert_eq!(value["name"], "Financial");
        assert!(value["created_by"].is_null());
    }
}
