use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissionStatus {
    Available,
    Assigned,
    EnRoute,
    OnSite,
    InProgress,
    AwaitingParts,
    Completed,
}

impl MissionStatus {
    /// Lifecycle transition table. `advance` checks targets against this
    /// table only; assignment itself goes through the dedicated assign path.
    pub fn allowed_next(self) -> &'static [MissionStatus] {
        match self {
            MissionStatus::Available => &[MissionStatus::Assigned],
            MissionStatus::Assigned => &[MissionStatus::EnRoute],
            MissionStatus::EnRoute => &[MissionStatus::OnSite],
            MissionStatus::OnSite => &[MissionStatus::InProgress],
            MissionStatus::InProgress => {
                &[MissionStatus::Completed, MissionStatus::AwaitingParts]
            }
            MissionStatus::AwaitingParts => &[MissionStatus::InProgress],
            MissionStatus::Completed => &[],
        }
    }

    pub fn can_advance_to(self, target: MissionStatus) -> bool {
        self.allowed_next().contains(&target)
    }

    /// SLA phase stamped when a mission enters this status, if any.
    /// Re-entering `in_progress` from `awaiting_parts` hits a phase that is
    /// already stamped, so the write-once rule in `SlaTimestamps` applies.
    pub fn sla_phase(self) -> Option<SlaPhase> {
        match self {
            MissionStatus::Assigned => Some(SlaPhase::Assigned),
            MissionStatus::EnRoute => Some(SlaPhase::EnRoute),
            MissionStatus::OnSite => Some(SlaPhase::OnSite),
            MissionStatus::InProgress => Some(SlaPhase::InProgress),
            MissionStatus::Completed => Some(SlaPhase::Completed),
            MissionStatus::Available | MissionStatus::AwaitingParts => None,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "available" => Some(MissionStatus::Available),
            "assigned" => Some(MissionStatus::Assigned),
            "en_route" => Some(MissionStatus::EnRoute),
            "on_site" => Some(MissionStatus::OnSite),
            "in_progress" => Some(MissionStatus::InProgress),
            "awaiting_parts" => Some(MissionStatus::AwaitingParts),
            "completed" => Some(MissionStatus::Completed),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MissionStatus::Available => "available",
            MissionStatus::Assigned => "assigned",
            MissionStatus::EnRoute => "en_route",
            MissionStatus::OnSite => "on_site",
            MissionStatus::InProgress => "in_progress",
            MissionStatus::AwaitingParts => "awaiting_parts",
            MissionStatus::Completed => "completed",
        }
    }
}

/// SLA phases in transition order. Timestamps for these are write-once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlaPhase {
    Assigned,
    EnRoute,
    OnSite,
    InProgress,
    Completed,
    ReportSubmitted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "low" => Some(RiskLevel::Low),
            "medium" => Some(RiskLevel::Medium),
            "high" => Some(RiskLevel::High),
            "critical" => Some(RiskLevel::Critical),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Normal,
    Urgent,
    Critical,
}

impl Priority {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "normal" => Some(Priority::Normal),
            "urgent" => Some(Priority::Urgent),
            "critical" => Some(Priority::Critical),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterventionType {
    Corrective,
    Preventive,
}

impl InterventionType {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "corrective" => Some(InterventionType::Corrective),
            "preventive" => Some(InterventionType::Preventive),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStatus {
    Resolved,
    PartiallyResolved,
    Unresolved,
    AwaitingParts,
}

impl ResolutionStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "resolved" => Some(ResolutionStatus::Resolved),
            "partially_resolved" => Some(ResolutionStatus::PartiallyResolved),
            "unresolved" => Some(ResolutionStatus::Unresolved),
            "awaiting_parts" => Some(ResolutionStatus::AwaitingParts),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Manager,
    Technician,
    Admin,
}

impl Role {
    pub fn is_back_office(self) -> bool {
        matches!(self, Role::Manager | Role::Admin)
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "manager" => Some(Role::Manager),
            "technician" => Some(Role::Technician),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationCategory {
    Mission,
    Report,
    Message,
    System,
    Other,
}
