//! Storage trait definitions for the API storage backends.

use crate::models::enums::{InterventionType, MissionStatus, Priority, RiskLevel, Role};
use crate::models::{Conversation, Message, Mission, Notification, User};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Filters for the general mission listing. All criteria are conjunctive;
/// `client` is a case-insensitive substring match.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MissionFilter {
    pub status: Option<MissionStatus>,
    pub risk_level: Option<RiskLevel>,
    pub priority: Option<Priority>,
    pub intervention_type: Option<InterventionType>,
    pub client: Option<String>,
    pub technician: Option<Uuid>,
}

impl MissionFilter {
    pub fn matches(&self, mission: &Mission) -> bool {
        if let Some(status) = self.status
            && mission.status != status
        {
            return false;
        }
        if let Some(risk) = self.risk_level
            && mission.risk_level != risk
        {
            return false;
        }
        if let Some(priority) = self.priority
            && mission.priority != priority
        {
            return false;
        }
        if let Some(kind) = self.intervention_type
            && mission.intervention_type != kind
        {
            return false;
        }
        if let Some(client) = &self.client
            && !mission
                .client
                .to_lowercase()
                .contains(&client.to_lowercase())
        {
            return false;
        }
        if let Some(technician) = self.technician
            && mission.assigned_technician != Some(technician)
        {
            return false;
        }
        true
    }
}

/// Storage backend trait for database operations
#[async_trait::async_trait]
pub trait StorageBackend: Send + Sync {
    // --- missions ---

    /// Persist a new mission
    async fn create_mission(&self, mission: Mission) -> Result<Mission, super::StorageError>;

    /// Get mission by ID
    async fn get_mission(&self, mission_id: Uuid) -> Result<Option<Mission>, super::StorageError>;

    /// Replace a mission record
    async fn update_mission(&self, mission: Mission) -> Result<Mission, super::StorageError>;

    /// Delete a mission
    async fn delete_mission(&self, mission_id: Uuid) -> Result<(), super::StorageError>;

    /// List missions matching the filter, newest first
    async fn list_missions(
        &self,
        filter: &MissionFilter,
    ) -> Result<Vec<Mission>, super::StorageError>;

    /// Total number of missions ever relevant for display id generation
    async fn count_missions(&self) -> Result<u64, super::StorageError>;

    /// Reserve a mission for a technician. Single conditional update:
    /// succeeds only while no technician is set, and writes assignee,
    /// `assigned` status and the SLA stamp in the same step. Loses with
    /// `AssignmentConflict`, never by overwriting.
    async fn assign_mission(
        &self,
        mission_id: Uuid,
        technician: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Mission, super::StorageError>;

    // --- conversations and messages ---

    /// Find the conversation between two principals, either order
    async fn find_conversation_between(
        &self,
        a: Uuid,
        b: Uuid,
    ) -> Result<Option<Conversation>, super::StorageError>;

    /// Persist a new conversation
    async fn create_conversation(
        &self,
        conversation: Conversation,
    ) -> Result<Conversation, super::StorageError>;

    /// Get conversation by ID
    async fn get_conversation(
        &self,
        conversation_id: Uuid,
    ) -> Result<Option<Conversation>, super::StorageError>;

    /// Conversations a principal participates in, most recent activity first
    async fn list_conversations_for(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<Conversation>, super::StorageError>;

    /// Append a message: stores it, points `last_message` at it and bumps
    /// the unread counter of every other participant, all in one step.
    async fn append_message(
        &self,
        conversation_id: Uuid,
        sender: Uuid,
        text: String,
    ) -> Result<(Message, Conversation), super::StorageError>;

    /// Messages of a conversation in creation order
    async fn list_messages(
        &self,
        conversation_id: Uuid,
    ) -> Result<Vec<Message>, super::StorageError>;

    /// Get message by ID
    async fn get_message(&self, message_id: Uuid) -> Result<Option<Message>, super::StorageError>;

    /// Rewrite a message body and flag it edited
    async fn update_message_text(
        &self,
        message_id: Uuid,
        text: String,
    ) -> Result<Message, super::StorageError>;

    /// Remove a message. When it was the conversation's `last_message` the
    /// pointer is recomputed from the newest remaining message. Returns the
    /// removed message and the conversation as left behind.
    async fn delete_message(
        &self,
        message_id: Uuid,
    ) -> Result<(Message, Conversation), super::StorageError>;

    /// Zero the unread counter of one participant
    async fn reset_unread(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> Result<Conversation, super::StorageError>;

    // --- notifications ---

    /// Persist a notification
    async fn create_notification(
        &self,
        notification: Notification,
    ) -> Result<Notification, super::StorageError>;

    /// Notifications addressed to a principal, newest first
    async fn list_notifications_for(
        &self,
        recipient: Uuid,
    ) -> Result<Vec<Notification>, super::StorageError>;

    /// Mark a notification read, scoped to its recipient
    async fn mark_notification_read(
        &self,
        notification_id: Uuid,
        recipient: Uuid,
    ) -> Result<Notification, super::StorageError>;

    // --- user directory ---

    /// Get user by ID
    async fn get_user(&self, user_id: Uuid) -> Result<Option<User>, super::StorageError>;

    /// Insert or replace a user record
    async fn upsert_user(&self, user: User) -> Result<User, super::StorageError>;

    /// All users holding a role (fan-out targeting)
    async fn list_users_by_role(&self, role: Role) -> Result<Vec<User>, super::StorageError>;

    /// Register a push device token, ignoring duplicates
    async fn add_device_token(
        &self,
        user_id: Uuid,
        token: &str,
    ) -> Result<User, super::StorageError>;
}
