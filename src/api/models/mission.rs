use super::enums::{
    InterventionType, MissionStatus, Priority, ResolutionStatus, RiskLevel, SlaPhase,
};
use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One timestamp per lifecycle phase. Each slot is written at most once and
/// never overwritten, so the record stays monotonic in transition order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SlaTimestamps {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub en_route: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub on_site: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_progress: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_submitted: Option<DateTime<Utc>>,
}

impl SlaTimestamps {
    /// Stamps the phase if it is still unset. Returns whether a write
    /// happened.
    pub fn stamp(&mut self, phase: SlaPhase, at: DateTime<Utc>) -> bool {
        let slot = self.slot_mut(phase);
        if slot.is_none() {
            *slot = Some(at);
            true
        } else {
            false
        }
    }

    pub fn get(&self, phase: SlaPhase) -> Option<DateTime<Utc>> {
        match phase {
            SlaPhase::Assigned => self.assigned,
            SlaPhase::EnRoute => self.en_route,
            SlaPhase::OnSite => self.on_site,
            SlaPhase::InProgress => self.in_progress,
            SlaPhase::Completed => self.completed,
            SlaPhase::ReportSubmitted => self.report_submitted,
        }
    }

    fn slot_mut(&mut self, phase: SlaPhase) -> &mut Option<DateTime<Utc>> {
        match phase {
            SlaPhase::Assigned => &mut self.assigned,
            SlaPhase::EnRoute => &mut self.en_route,
            SlaPhase::OnSite => &mut self.on_site,
            SlaPhase::InProgress => &mut self.in_progress,
            SlaPhase::Completed => &mut self.completed,
            SlaPhase::ReportSubmitted => &mut self.report_submitted,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaterialUsed {
    pub name: String,
    pub quantity: u32,
}

/// Intervention report embedded in the mission. Submitted by the assigned
/// technician, validated by back office.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub work_performed: String,
    pub resolution_status: ResolutionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_step: Option<String>,
    #[serde(default)]
    pub materials_used: Vec<MaterialUsed>,
    #[serde(default)]
    pub photos: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_signature: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default)]
    pub validated: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mission {
    pub id: Uuid,
    /// Human-readable id, e.g. "M-007-2026".
    pub display_id: String,
    pub client: String,
    pub address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub site: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub equipment_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub equipment_id: Option<String>,
    pub risk_level: RiskLevel,
    pub priority: Priority,
    pub intervention_type: InterventionType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub replacement_required: bool,
    pub status: MissionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_technician: Option<Uuid>,
    pub created_by: Uuid,
    /// Reporting flag, kept in sync with `status == completed`.
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub sla: SlaTimestamps,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<Report>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Mission {
    pub fn new(
        display_id: String,
        client: String,
        address: String,
        risk_level: RiskLevel,
        intervention_type: InterventionType,
        created_by: Uuid,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            display_id,
            client,
            address,
            site: None,
            title: None,
            equipment_type: None,
            equipment_id: None,
            risk_level,
            priority: Priority::Normal,
            intervention_type,
            due_date: None,
            description: None,
            replacement_required: false,
            status: MissionStatus::Available,
            assigned_technician: None,
            created_by,
            completed: false,
            sla: SlaTimestamps::default(),
            report: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// "M-<seq>-<year>" with a zero-padded 3 digit sequence.
    pub fn display_id_for(sequence: u64) -> String {
        format!("M-{:03}-{}", sequence, Utc::now().year())
    }
}
