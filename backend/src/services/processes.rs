use serde::Deserialize;
use sqlx::{FromRow, PgPool};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use super::{
    all_exist_in_organization, fetch_page, patch_nullable, replace_links, Actor, ServiceError,
    ServiceResult,
};
use crate::pagination::{PaginatedResponse, PaginationParams};
use crate::validation::{nullable, patched, Validate, ValidationResult, Validator};
use bcms_shared::{Application, Department, Location, Process, ProcessDetail, ProcessSummary};

pub const SORT_FIELDS: &[&str] = &[
    "name",
    "criticality_level",
    "rto",
    "rpo",
    "number_of_team_members",
    "created_at",
    "updated_at",
];

const LOCATIONS_OUTSIDE_DEPARTMENT: &str =
    "One or more process locations are not associated with the selected department.";

#[derive(Debug, Clone, Deserialize)]
pub struct CreateProcess {
    pub name: String,
    pub description: Option<String>,
    pub department_id: Uuid,
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
    #[serde(default)]
    pub location_ids: Vec<Uuid>,
    #[serde(default)]
    pub application_ids: Vec<Uuid>,
    #[serde(default)]
    pub upstream_dependency_ids: Vec<Uuid>,
    #[serde(default)]
    pub downstream_dependency_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateProcess {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub description: Option<Option<String>>,
    pub department_id: Option<Uuid>,
    #[serde(default, deserialize_with = "nullable")]
    pub sla: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub tat: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub seasonality: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub peak_times: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub frequency: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub number_of_team_members: Option<Option<i32>>,
    #[serde(default, deserialize_with = "nullable")]
    pub rto: Option<Option<f64>>,
    #[serde(default, deserialize_with = "nullable")]
    pub rpo: Option<Option<f64>>,
    #[serde(default, deserialize_with = "nullable")]
    pub criticality_level: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub process_owner_id: Option<Option<Uuid>>,
    pub location_ids: Option<Vec<Uuid>>,
    pub application_ids: Option<Vec<Uuid>>,
    pub upstream_dependency_ids: Option<Vec<Uuid>>,
    pub downstream_dependency_ids: Option<Vec<Uuid>>,
}

impl Validate for CreateProcess {
    fn validate(&self) -> ValidationResult<()> {
        Validator::new()
            .name(&self.name, "name", 255)
            .max_length(self.sla.as_deref(), "sla", 255)
            .max_length(self.tat.as_deref(), "tat", 255)
            .max_length(self.criticality_level.as_deref(), "criticality_level", 50)
            .non_negative_i32(self.number_of_team_members, "number_of_team_members")
            .non_negative_f64(self.rto, "rto")
            .non_negative_f64(self.rpo, "rpo")
            .finish()
    }
}

impl Validate for UpdateProcess {
    fn validate(&self) -> ValidationResult<()> {
        Validator::new()
            .optional_name(self.name.as_deref(), "name", 255)
            .max_length(patched(&self.sla), "sla", 255)
            .max_length(patched(&self.tat), "tat", 255)
            .max_length(patched(&self.criticality_level), "criticality_level", 50)
            .non_negative_i32(self.number_of_team_members.flatten(), "number_of_team_members")
            .non_negative_f64(self.rto.flatten(), "rto")
            .non_negative_f64(self.rpo.flatten(), "rpo")
            .finish()
    }
}

/// Every requested location must already be linked to the department.
pub fn locations_within_department(requested: &[Uuid], department_locations: &HashSet<Uuid>) -> bool {
    requested.iter().all(|id| department_locations.contains(id))
}

#[derive(FromRow)]
struct LinkedLocation {
    process_id: Uuid,
    #[sqlx(flatten)]
    location: Location,
}

#[derive(FromRow)]
struct LinkedApplication {
    process_id: Uuid,
    #[sqlx(flatten)]
    application: Application,
}

#[derive(FromRow)]
struct LinkedProcess {
    process_id: Uuid,
    #[sqlx(flatten)]
    summary: ProcessSummary,
}

fn group<T>(rows: impl IntoIterator<Item = (Uuid, T)>) -> HashMap<Uuid, Vec<T>> {
    let mut grouped: HashMap<Uuid, Vec<T>> = HashMap::new();
    for (owner, item) in rows {
        grouped.entry(owner).or_default().push(item);
    }
    grouped
}

pub struct ProcessService {
    pool: PgPool,
}

impl ProcessService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn load_details(&self, processes: Vec<Process>) -> ServiceResult<Vec<ProcessDetail>> {
        let ids: Vec<Uuid> = processes.iter().map(|p| p.id).collect();
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let locations = sqlx::query_as::<_, LinkedLocation>(
            r#"
            SELECT pl.process_id, l.*
            FROM locations l
            JOIN process_locations pl ON pl.location_id = l.id
            WHERE pl.process_id = ANY($1) AND l.is_active
            ORDER BY l.name
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let applications = sqlx::query_as::<_, LinkedApplication>(
            r#"
            SELECT pa.process_id, a.*
            FROM applications a
            JOIN process_applications pa ON pa.application_id = a.id
            WHERE pa.process_id = ANY($1) AND a.deleted_at IS NULL
            ORDER BY a.name
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let upstream = sqlx::query_as::<_, LinkedProcess>(
            r#"
            SELECT pd.downstream_process_id AS process_id, p.id, p.name
            FROM processes p
            JOIN process_dependencies pd ON pd.upstream_process_id = p.id
            WHERE pd.downstream_process_id = ANY($1) AND NOT p.is_deleted
            ORDER BY p.name
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let downstream = sqlx::query_as::<_, LinkedProcess>(
            r#"
            SELECT pd.upstream_process_id AS process_id, p.id, p.name
            FROM processes p
            JOIN process_dependencies pd ON pd.downstream_process_id = p.id
            WHERE pd.upstream_process_id = ANY($1) AND NOT p.is_deleted
            ORDER BY p.name
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut locations = group(locations.into_iter().map(|r| (r.process_id, r.location)));
        let mut applications = group(applications.into_iter().map(|r| (r.process_id, r.application)));
        let mut upstream = group(upstream.into_iter().map(|r| (r.process_id, r.summary)));
        let mut downstream = group(downstream.into_iter().map(|r| (r.process_id, r.summary)));

        Ok(processes
            .into_iter()
            .map(|process| ProcessDetail {
                locations: locations.remove(&process.id).unwrap_or_default(),
                applications: applications.remove(&process.id).unwrap_or_default(),
                upstream_dependencies: upstream.remove(&process.id).unwrap_or_default(),
                downstream_dependencies: downstream.remove(&process.id).unwrap_or_default(),
                process,
            })
            .collect())
    }

    async fn detail(&self, process: Process) -> ServiceResult<ProcessDetail> {
        self.load_details(vec![process])
            .await?
            .pop()
            .ok_or_else(|| ServiceError::NotFound("Process".to_string()))
    }

    pub async fn list(
        &self,
        actor: &Actor,
        params: &PaginationParams,
    ) -> ServiceResult<PaginatedResponse<ProcessDetail>> {
        let page = fetch_page::<Process>(
            &self.pool,
            "processes",
            "NOT is_deleted",
            actor.organization_id,
            params,
            SORT_FIELDS,
            "name",
        )
        .await?;

        let details = self.load_details(page.data).await?;
        Ok(PaginatedResponse {
            data: details,
            meta: page.meta,
        })
    }

    async fn find_live(&self, actor: &Actor, id: Uuid) -> ServiceResult<Process> {
        sqlx::query_as::<_, Process>(
            "SELECT * FROM processes WHERE id = $1 AND organization_id = $2 AND NOT is_deleted",
        )
        .bind(id)
        .bind(actor.organization_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| ServiceError::NotFound("Process".to_string()))
    }

    pub async fn get(&self, actor: &Actor, id: Uuid) -> ServiceResult<ProcessDetail> {
        let process = self.find_live(actor, id).await?;
        self.detail(process).await
    }

    async fn live_department(&self, actor: &Actor, department_id: Uuid) -> ServiceResult<Department> {
        sqlx::query_as::<_, Department>(
            "SELECT * FROM departments WHERE id = $1 AND organization_id = $2 AND NOT is_deleted",
        )
        .bind(department_id)
        .bind(actor.organization_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| ServiceError::NotFound("Department".to_string()))
    }

    async fn department_location_ids(&self, department_id: Uuid) -> ServiceResult<HashSet<Uuid>> {
        let ids: Vec<Uuid> = sqlx::query_scalar(
            "SELECT location_id FROM department_locations WHERE department_id = $1",
        )
        .bind(department_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids.into_iter().collect())
    }

    async fn current_location_ids(&self, process_id: Uuid) -> ServiceResult<Vec<Uuid>> {
        let ids: Vec<Uuid> = sqlx::query_scalar(
            "SELECT location_id FROM process_locations WHERE process_id = $1",
        )
        .bind(process_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn check_locations(&self, actor: &Actor, department: &Department, location_ids: &[Uuid]) -> ServiceResult<()> {
        if location_ids.is_empty() {
            return Ok(());
        }
        if !all_exist_in_organization(&self.pool, "locations", "is_active", location_ids, actor.organization_id)
            .await?
        {
            return Err(ServiceError::NotFound("One or more locations".to_string()));
        }
        let allowed = self.department_location_ids(department.id).await?;
        if locations_within_department(location_ids, &allowed) {
            Ok(())
        } else {
            Err(ServiceError::BadRequest(LOCATIONS_OUTSIDE_DEPARTMENT.to_string()))
        }
    }

    async fn check_owner(&self, actor: &Actor, owner_id: Option<Uuid>) -> ServiceResult<()> {
        let Some(owner_id) = owner_id else {
            return Ok(());
        };
        if all_exist_in_organization(&self.pool, "users", "is_active", &[owner_id], actor.organization_id).await? {
            Ok(())
        } else {
            Err(ServiceError::NotFound("Process owner".to_string()))
        }
    }

    async fn check_links(
        &self,
        actor: &Actor,
        application_ids: Option<&[Uuid]>,
        upstream: Option<&[Uuid]>,
        downstream: Option<&[Uuid]>,
    ) -> ServiceResult<()> {
        if let Some(ids) = application_ids {
            if !all_exist_in_organization(&self.pool, "applications", "deleted_at IS NULL", ids, actor.organization_id)
                .await?
            {
                return Err(ServiceError::NotFound("One or more applications".to_string()));
            }
        }
        for ids in [upstream, downstream].into_iter().flatten() {
            if !all_exist_in_organization(&self.pool, "processes", "NOT is_deleted", ids, actor.organization_id)
                .await?
            {
                return Err(ServiceError::NotFound("One or more dependent processes".to_string()));
            }
        }
        Ok(())
    }

    async fn name_taken(&self, department_id: Uuid, name: &str, except: Option<Uuid>) -> ServiceResult<bool> {
        let taken: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM processes
                WHERE department_id = $1 AND name = $2 AND NOT is_deleted
                  AND ($3::uuid IS NULL OR id <> $3)
            )
            "#,
        )
        .bind(department_id)
        .bind(name)
        .bind(except)
        .fetch_one(&self.pool)
        .await?;
        Ok(taken)
    }

    fn duplicate_name(name: &str, department: &Department) -> ServiceError {
        ServiceError::Conflict(format!(
            "A process with the name '{}' already exists in the department '{}'.",
            name, department.name
        ))
    }

    pub async fn create(&self, actor: &Actor, input: CreateProcess) -> ServiceResult<ProcessDetail> {
        let department = self.live_department(actor, input.department_id).await?;
        self.check_owner(actor, input.process_owner_id).await?;

        let name = input.name.trim().to_string();
        if self.name_taken(department.id, &name, None).await? {
            return Err(Self::duplicate_name(&name, &department));
        }

        self.check_locations(actor, &department, &input.location_ids).await?;
        self.check_links(
            actor,
            Some(&input.application_ids),
            Some(&input.upstream_dependency_ids),
            Some(&input.downstream_dependency_ids),
        )
        .await?;

        let mut tx = self.pool.begin().await?;

        let process = sqlx::query_as::<_, Process>(
            r#"
            INSERT INTO processes (
                id, organization_id, department_id, name, description, sla, tat, seasonality,
                peak_times, frequency, number_of_team_members, rto, rpo, criticality_level,
                process_owner_id, created_by_id, updated_by_id
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $16)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(actor.organization_id)
        .bind(department.id)
        .bind(&name)
        .bind(&input.description)
        .bind(&input.sla)
        .bind(&input.tat)
        .bind(&input.seasonality)
        .bind(&input.peak_times)
        .bind(&input.frequency)
        .bind(input.number_of_team_members)
        .bind(input.rto)
        .bind(input.rpo)
        .bind(&input.criticality_level)
        .bind(input.process_owner_id)
        .bind(actor.user_id)
        .fetch_one(&mut *tx)
        .await?;

        replace_links(&mut tx, "process_locations", "process_id", process.id, "location_id", &input.location_ids)
            .await?;
        replace_links(
            &mut tx,
            "process_applications",
            "process_id",
            process.id,
            "application_id",
            &input.application_ids,
        )
        .await?;
        replace_links(
            &mut tx,
            "process_dependencies",
            "downstream_process_id",
            process.id,
            "upstream_process_id",
            &input.upstream_dependency_ids,
        )
        .await?;
        replace_links(
            &mut tx,
            "process_dependencies",
            "upstream_process_id",
            process.id,
            "downstream_process_id",
            &input.downstream_dependency_ids,
        )
        .await?;

        tx.commit().await?;

        tracing::info!(process_id = %process.id, department_id = %department.id, "process created");
        self.detail(process).await
    }

    pub async fn update(&self, actor: &Actor, id: Uuid, input: UpdateProcess) -> ServiceResult<ProcessDetail> {
        let mut process = self.find_live(actor, id).await?;

        let self_dependency = [&input.upstream_dependency_ids, &input.downstream_dependency_ids]
            .into_iter()
            .flatten()
            .any(|ids| ids.contains(&id));
        if self_dependency {
            return Err(ServiceError::BadRequest("A process cannot depend on itself.".to_string()));
        }

        let department_changed = input.department_id.is_some_and(|d| d != process.department_id);
        let department = self
            .live_department(actor, input.department_id.unwrap_or(process.department_id))
            .await?;

        // Revalidate the locations that will be linked once the update lands
        if department_changed || input.location_ids.is_some() {
            let prospective = match &input.location_ids {
                Some(ids) => ids.clone(),
                None => self.current_location_ids(id).await?,
            };
            self.check_locations(actor, &department, &prospective).await?;
        }

        if let Some(owner) = input.process_owner_id {
            self.check_owner(actor, owner).await?;
        }

        let name = input
            .name
            .as_deref()
            .map(str::trim)
            .unwrap_or(&process.name)
            .to_string();
        if (name != process.name || department_changed) && self.name_taken(department.id, &name, Some(id)).await? {
            return Err(Self::duplicate_name(&name, &department));
        }

        self.check_links(
            actor,
            input.application_ids.as_deref(),
            input.upstream_dependency_ids.as_deref(),
            input.downstream_dependency_ids.as_deref(),
        )
        .await?;

        process.name = name;
        process.department_id = department.id;
        patch_nullable(&mut process.description, input.description);
        patch_nullable(&mut process.sla, input.sla);
        patch_nullable(&mut process.tat, input.tat);
        patch_nullable(&mut process.seasonality, input.seasonality);
        patch_nullable(&mut process.peak_times, input.peak_times);
        patch_nullable(&mut process.frequency, input.frequency);
        patch_nullable(&mut process.number_of_team_members, input.number_of_team_members);
        patch_nullable(&mut process.rto, input.rto);
        patch_nullable(&mut process.rpo, input.rpo);
        patch_nullable(&mut process.criticality_level, input.criticality_level);
        patch_nullable(&mut process.process_owner_id, input.process_owner_id);
        process.updated_by_id = Some(actor.user_id);

        let mut tx = self.pool.begin().await?;

        let process = sqlx::query_as::<_, Process>(
            r#"
            UPDATE processes
            SET name = $2, description = $3, department_id = $4, sla = $5, tat = $6,
                seasonality = $7, peak_times = $8, frequency = $9, number_of_team_members = $10,
                rto = $11, rpo = $12, criticality_level = $13, process_owner_id = $14,
                updated_by_id = $15, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&process.name)
        .bind(&process.description)
        .bind(process.department_id)
        .bind(&process.sla)
        .bind(&process.tat)
        .bind(&process.seasonality)
        .bind(&process.peak_times)
        .bind(&process.frequency)
        .bind(process.number_of_team_members)
        .bind(process.rto)
        .bind(process.rpo)
        .bind(&process.criticality_level)
        .bind(process.process_owner_id)
        .bind(process.updated_by_id)
        .fetch_one(&mut *tx)
        .await?;

        if let Some(ids) = &input.location_ids {
            replace_links(&mut tx, "process_locations", "process_id", id, "location_id", ids).await?;
        }
        if let Some(ids) = &input.application_ids {
            replace_links(&mut tx, "process_applications", "process_id", id, "application_id", ids).await?;
        }
        if let Some(ids) = &input.upstream_dependency_ids {
            replace_links(&mut tx, "process_dependencies", "downstream_process_id", id, "upstream_process_id", ids)
                .await?;
        }
        if let Some(ids) = &input.downstream_dependency_ids {
            replace_links(&mut tx, "process_dependencies", "upstream_process_id", id, "downstream_process_id", ids)
                .await?;
        }

        tx.commit().await?;

        tracing::info!(process_id = %id, "process updated");
        self.detail(process).await
    }

    /// Soft delete; a second call returns the already deleted row.
    pub async fn delete(&self, actor: &Actor, id: Uuid) -> ServiceResult<ProcessDetail> {
        let process = sqlx::query_as::<_, Process>(
            "SELECT * FROM processes WHERE id = $1 AND organization_id = $2",
        )
        .bind(id)
        .bind(actor.organization_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| ServiceError::NotFound("Process".to_string()))?;

        if process.is_deleted {
            return self.detail(process).await;
        }

        let process = sqlx::query_as::<_, Process>(
            r#"
            UPDATE processes
            SET is_active = FALSE, is_deleted = TRUE, deleted_at = NOW(),
                updated_by_id = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(actor.user_id)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(process_id = %id, "process deleted");
        self.detail(process).await
    }
}
