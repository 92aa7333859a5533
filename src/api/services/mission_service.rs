//! Mission lifecycle operations.
//!
//! Owns the transition table checks, exclusive assignment, SLA timestamp
//! capture and the report workflow. Every state-changing operation persists
//! first, then hands the affected audience to the notifier; fan-out never
//! fails the primary mutation.

use crate::models::enums::{
    InterventionType, MissionStatus, NotificationCategory, Priority, ResolutionStatus, RiskLevel,
};
use crate::models::mission::MaterialUsed;
use crate::models::{Mission, Principal, Report};
use crate::routes::error::ApiError;
use crate::services::notifier::Notifier;
use crate::storage::{MissionFilter, StorageBackend};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

/// Request body for creating a mission. Required fields arrive as options so
/// a missing value reports a validation error instead of failing
/// deserialization.
#[derive(Debug, Default, Deserialize)]
pub struct CreateMissionRequest {
    pub client: Option<String>,
    pub address: Option<String>,
    pub site: Option<String>,
    pub title: Option<String>,
    pub equipment_type: Option<String>,
    pub equipment_id: Option<String>,
    pub risk_level: Option<String>,
    pub priority: Option<String>,
    pub intervention_type: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub description: Option<String>,
    pub replacement_required: Option<bool>,
    /// Caller-supplied display id; generated from the mission count when
    /// absent.
    pub display_id: Option<String>,
}

/// Request body for the manager-side full edit. Absent fields stay unchanged.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateMissionRequest {
    pub client: Option<String>,
    pub address: Option<String>,
    pub site: Option<String>,
    pub title: Option<String>,
    pub equipment_type: Option<String>,
    pub equipment_id: Option<String>,
    pub risk_level: Option<String>,
    pub priority: Option<String>,
    pub intervention_type: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub description: Option<String>,
    pub replacement_required: Option<bool>,
    pub status: Option<String>,
    pub assigned_technician: Option<Uuid>,
}

/// Request body for the technician's intervention report.
#[derive(Debug, Default, Deserialize)]
pub struct SubmitReportRequest {
    pub work_performed: Option<String>,
    pub resolution_status: Option<String>,
    pub next_step: Option<String>,
    pub materials_used: Option<Vec<MaterialUsed>>,
    pub photos: Option<Vec<String>>,
    pub client_signature: Option<String>,
    pub notes: Option<String>,
}

/// Query parameters for GET /missions
#[derive(Debug, Default, Deserialize)]
pub struct MissionListQuery {
    pub status: Option<String>,
    pub risk_level: Option<String>,
    pub priority: Option<String>,
    pub intervention_type: Option<String>,
    pub client: Option<String>,
    pub technician: Option<Uuid>,
}

impl MissionListQuery {
    pub fn into_filter(self) -> Result<MissionFilter, ApiError> {
        Ok(MissionFilter {
            status: parse_field(self.status, "status", MissionStatus::parse)?,
            risk_level: parse_field(self.risk_level, "risk_level", RiskLevel::parse)?,
            priority: parse_field(self.priority, "priority", Priority::parse)?,
            intervention_type: parse_field(
                self.intervention_type,
                "intervention_type",
                InterventionType::parse,
            )?,
            client: self.client,
            technician: self.technician,
        })
    }
}

fn parse_field<T>(
    value: Option<String>,
    name: &str,
    parse: impl Fn(&str) -> Option<T>,
) -> Result<Option<T>, ApiError> {
    match value {
        None => Ok(None),
        Some(s) => parse(&s)
            .map(Some)
            .ok_or_else(|| ApiError::Validation(format!("unknown {name}: {s}"))),
    }
}

fn required_text(value: Option<String>, name: &str) -> Result<String, ApiError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::Validation(format!("{name} is required")))
}

pub struct MissionService {
    storage: Arc<dyn StorageBackend>,
    notifier: Arc<Notifier>,
}

impl MissionService {
    pub fn new(storage: Arc<dyn StorageBackend>, notifier: Arc<Notifier>) -> Self {
        Self { storage, notifier }
    }

    /// Create a mission (back office only) and announce it to every
    /// technician.
    pub async fn create(
        &self,
        actor: Principal,
        req: CreateMissionRequest,
    ) -> Result<Mission, ApiError> {
        if !actor.role.is_back_office() {
            return Err(ApiError::Forbidden(
                "manager or admin role required".to_string(),
            ));
        }

        let client = required_text(req.client, "client")?;
        let address = required_text(req.address, "address")?;
        let risk_level = req
            .risk_level
            .as_deref()
            .and_then(RiskLevel::parse)
            .ok_or_else(|| {
                ApiError::Validation("risk_level must be low, medium, high or critical".to_string())
            })?;
        let intervention_type = req
            .intervention_type
            .as_deref()
            .and_then(InterventionType::parse)
            .ok_or_else(|| {
                ApiError::Validation(
                    "intervention_type must be corrective or preventive".to_string(),
                )
            })?;
        let priority = match req.priority.as_deref() {
            None => Priority::Normal,
            Some(s) => Priority::parse(s).ok_or_else(|| {
                ApiError::Validation("priority must be normal, urgent or critical".to_string())
            })?,
        };

        let display_id = match req.display_id.map(|d| d.trim().to_string()) {
            Some(d) if !d.is_empty() => d,
            _ => {
                let sequence = self.storage.count_missions().await? + 1;
                Mission::display_id_for(sequence)
            }
        };

        let mut mission = Mission::new(
            display_id,
            client,
            address,
            risk_level,
            intervention_type,
            actor.id,
        );
        mission.priority = priority;
        mission.site = req.site;
        mission.title = req.title;
        mission.equipment_type = req.equipment_type;
        mission.equipment_id = req.equipment_id;
        mission.due_date = req.due_date;
        mission.description = req.description;
        mission.replacement_required = req.replacement_required.unwrap_or(false);

        let mission = self.storage.create_mission(mission).await?;

        let recipients = self.notifier.technician_recipients().await;
        self.notifier
            .notify(
                &recipients,
                "New mission available",
                &format!(
                    "Mission {} for {} is available",
                    mission.display_id, mission.client
                ),
                NotificationCategory::Mission,
                Some(mission.id),
            )
            .await;

        Ok(mission)
    }

    /// Exclusive self-assignment. The storage layer performs the
    /// test-and-set; a lost race surfaces as a conflict and changes nothing.
    pub async fn assign(&self, mission_id: Uuid, actor: Principal) -> Result<Mission, ApiError> {
        if actor.role != crate::models::enums::Role::Technician {
            return Err(ApiError::Forbidden(
                "only technicians can accept missions".to_string(),
            ));
        }

        let mission = self
            .storage
            .assign_mission(mission_id, actor.id, Utc::now())
            .await?;

        let technician = match self.storage.get_user(actor.id).await {
            Ok(Some(user)) => format!("{} {}", user.first_name, user.last_name),
            _ => "a technician".to_string(),
        };
        let recipients = self.notifier.back_office_recipients().await;
        self.notifier
            .notify(
                &recipients,
                "Mission assigned",
                &format!(
                    "Mission {} was accepted by {}",
                    mission.display_id, technician
                ),
                NotificationCategory::Mission,
                Some(mission.id),
            )
            .await;

        Ok(mission)
    }

    /// Move a mission along the lifecycle. Only the assigned technician may
    /// advance, and only to a successor of the current status.
    pub async fn advance(
        &self,
        mission_id: Uuid,
        actor: Principal,
        target: MissionStatus,
    ) -> Result<Mission, ApiError> {
        let mut mission = self.get(mission_id).await?;

        if mission.assigned_technician != Some(actor.id) {
            return Err(ApiError::Forbidden(
                "only the assigned technician can update this mission".to_string(),
            ));
        }
        if !mission.status.can_advance_to(target) {
            return Err(ApiError::Validation(format!(
                "cannot move mission from {} to {}",
                mission.status.as_str(),
                target.as_str()
            )));
        }

        let now = Utc::now();
        if let Some(phase) = target.sla_phase() {
            mission.sla.stamp(phase, now);
        }
        mission.status = target;
        if target == MissionStatus::Completed {
            mission.completed = true;
        }
        mission.updated_at = now;

        let mission = self.storage.update_mission(mission).await?;

        let recipients = self.notifier.back_office_recipients().await;
        self.notifier
            .notify(
                &recipients,
                "Mission status updated",
                &format!(
                    "Mission {} is now {}",
                    mission.display_id,
                    mission.status.as_str()
                ),
                NotificationCategory::Mission,
                Some(mission.id),
            )
            .await;

        Ok(mission)
    }

    /// Back-office full edit. Provided fields replace the stored ones; the
    /// reporting flag follows the (possibly overridden) status, and a status
    /// override into `completed` stamps the matching SLA slot if still unset.
    pub async fn update(
        &self,
        mission_id: Uuid,
        actor: Principal,
        req: UpdateMissionRequest,
    ) -> Result<Mission, ApiError> {
        if !actor.role.is_back_office() {
            return Err(ApiError::Forbidden(
                "manager or admin role required".to_string(),
            ));
        }

        let mut mission = self.get(mission_id).await?;

        if let Some(client) = req.client {
            mission.client = required_text(Some(client), "client")?;
        }
        if let Some(address) = req.address {
            mission.address = required_text(Some(address), "address")?;
        }
        if req.site.is_some() {
            mission.site = req.site;
        }
        if req.title.is_some() {
            mission.title = req.title;
        }
        if req.equipment_type.is_some() {
            mission.equipment_type = req.equipment_type;
        }
        if req.equipment_id.is_some() {
            mission.equipment_id = req.equipment_id;
        }
        if let Some(risk) = parse_field(req.risk_level, "risk_level", RiskLevel::parse)? {
            mission.risk_level = risk;
        }
        if let Some(priority) = parse_field(req.priority, "priority", Priority::parse)? {
            mission.priority = priority;
        }
        if let Some(kind) = parse_field(
            req.intervention_type,
            "intervention_type",
            InterventionType::parse,
        )? {
            mission.intervention_type = kind;
        }
        if req.due_date.is_some() {
            mission.due_date = req.due_date;
        }
        if req.description.is_some() {
            mission.description = req.description;
        }
        if let Some(replacement) = req.replacement_required {
            mission.replacement_required = replacement;
        }
        if req.assigned_technician.is_some() {
            mission.assigned_technician = req.assigned_technician;
        }
        if let Some(status) = parse_field(req.status, "status", MissionStatus::parse)? {
            mission.status = status;
        }

        let now = Utc::now();
        mission.completed = mission.status == MissionStatus::Completed;
        if mission.completed {
            mission.sla.stamp(crate::models::enums::SlaPhase::Completed, now);
        }
        mission.updated_at = now;

        let mission = self.storage.update_mission(mission).await?;

        if let Some(technician) = mission.assigned_technician {
            self.notifier
                .notify(
                    &[technician],
                    "Mission updated",
                    &format!("Mission {} was updated", mission.display_id),
                    NotificationCategory::Mission,
                    Some(mission.id),
                )
                .await;
        }

        Ok(mission)
    }

    /// Remove a mission (back office only) and tell its technician, if any.
    pub async fn delete(&self, mission_id: Uuid, actor: Principal) -> Result<(), ApiError> {
        if !actor.role.is_back_office() {
            return Err(ApiError::Forbidden(
                "manager or admin role required".to_string(),
            ));
        }

        let mission = self.get(mission_id).await?;
        self.storage.delete_mission(mission_id).await?;

        if let Some(technician) = mission.assigned_technician {
            self.notifier
                .notify(
                    &[technician],
                    "Mission deleted",
                    &format!("Mission {} was deleted", mission.display_id),
                    NotificationCategory::Mission,
                    Some(mission.id),
                )
                .await;
        }

        Ok(())
    }

    /// Upsert the intervention report (assigned technician only). Submission
    /// always resets validation; the report_submitted SLA slot is stamped on
    /// first submission only.
    pub async fn submit_report(
        &self,
        mission_id: Uuid,
        actor: Principal,
        req: SubmitReportRequest,
    ) -> Result<Mission, ApiError> {
        let mut mission = self.get(mission_id).await?;

        if mission.assigned_technician != Some(actor.id) {
            return Err(ApiError::Forbidden(
                "only the assigned technician can submit a report".to_string(),
            ));
        }

        let work_performed = required_text(req.work_performed, "work_performed")?;
        let resolution_status = req
            .resolution_status
            .as_deref()
            .and_then(ResolutionStatus::parse)
            .ok_or_else(|| {
                ApiError::Validation(
                    "resolution_status must be resolved, partially_resolved, unresolved or awaiting_parts"
                        .to_string(),
                )
            })?;

        mission.report = Some(Report {
            work_performed,
            resolution_status,
            next_step: req.next_step,
            materials_used: req.materials_used.unwrap_or_default(),
            photos: req.photos.unwrap_or_default(),
            client_signature: req.client_signature,
            notes: req.notes,
            validated: false,
        });

        let now = Utc::now();
        mission
            .sla
            .stamp(crate::models::enums::SlaPhase::ReportSubmitted, now);
        mission.updated_at = now;

        let mission = self.storage.update_mission(mission).await?;

        let recipients = self.notifier.back_office_recipients().await;
        self.notifier
            .notify(
                &recipients,
                "Report submitted",
                &format!("A report was submitted for mission {}", mission.display_id),
                NotificationCategory::Report,
                Some(mission.id),
            )
            .await;

        Ok(mission)
    }

    /// Read the report of a mission (back office only).
    pub async fn view_report(
        &self,
        mission_id: Uuid,
        actor: Principal,
    ) -> Result<Report, ApiError> {
        if !actor.role.is_back_office() {
            return Err(ApiError::Forbidden(
                "manager or admin role required".to_string(),
            ));
        }

        let mission = self.get(mission_id).await?;
        mission
            .report
            .ok_or_else(|| ApiError::NotFound("report".to_string()))
    }

    /// Approve a submitted report (back office only).
    pub async fn validate_report(
        &self,
        mission_id: Uuid,
        actor: Principal,
    ) -> Result<Mission, ApiError> {
        if !actor.role.is_back_office() {
            return Err(ApiError::Forbidden(
                "manager or admin role required".to_string(),
            ));
        }

        let mut mission = self.get(mission_id).await?;
        let Some(report) = mission.report.as_mut() else {
            return Err(ApiError::Conflict(
                "no report has been submitted for this mission".to_string(),
            ));
        };
        report.validated = true;
        mission.updated_at = Utc::now();

        let mission = self.storage.update_mission(mission).await?;

        if let Some(technician) = mission.assigned_technician {
            self.notifier
                .notify(
                    &[technician],
                    "Report validated",
                    &format!(
                        "Your report for mission {} was validated",
                        mission.display_id
                    ),
                    NotificationCategory::Report,
                    Some(mission.id),
                )
                .await;
        }

        Ok(mission)
    }

    /// General listing with conjunctive filters, newest first.
    pub async fn list(&self, filter: &MissionFilter) -> Result<Vec<Mission>, ApiError> {
        Ok(self.storage.list_missions(filter).await?)
    }

    /// The browse-open-work view: only missions still waiting for a
    /// technician.
    pub async fn list_available(&self) -> Result<Vec<Mission>, ApiError> {
        let filter = MissionFilter {
            status: Some(MissionStatus::Available),
            ..MissionFilter::default()
        };
        Ok(self.storage.list_missions(&filter).await?)
    }

    pub async fn get(&self, mission_id: Uuid) -> Result<Mission, ApiError> {
        self.storage
            .get_mission(mission_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("mission".to_string()))
    }
}
