//! In-memory storage backend implementation.
//!
//! Default backend when no `DATABASE_URL` is configured; also backs the test
//! suites. All records live behind a single `RwLock`, so multi-record
//! operations such as assignment and message append run under one write
//! guard and stay atomic.

use super::{StorageError, traits::*};
use crate::models::enums::{MissionStatus, Role, SlaPhase};
use crate::models::{Conversation, Message, Mission, Notification, User};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct MemoryState {
    missions: HashMap<Uuid, Mission>,
    conversations: HashMap<Uuid, Conversation>,
    /// Messages per conversation in append order.
    messages: HashMap<Uuid, Vec<Message>>,
    /// Message id -> owning conversation.
    message_index: HashMap<Uuid, Uuid>,
    notifications: HashMap<Uuid, Notification>,
    users: HashMap<Uuid, User>,
}

/// In-memory storage backend.
pub struct MemoryStorageBackend {
    state: RwLock<MemoryState>,
}

impl MemoryStorageBackend {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(MemoryState::default()),
        }
    }
}

impl Default for MemoryStorageBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageBackend for MemoryStorageBackend {
    async fn create_mission(&self, mission: Mission) -> Result<Mission, StorageError> {
        let mut state = self.state.write().await;
        state.missions.insert(mission.id, mission.clone());
        Ok(mission)
    }

    async fn get_mission(&self, mission_id: Uuid) -> Result<Option<Mission>, StorageError> {
        let state = self.state.read().await;
        Ok(state.missions.get(&mission_id).cloned())
    }

    async fn update_mission(&self, mission: Mission) -> Result<Mission, StorageError> {
        let mut state = self.state.write().await;
        if !state.missions.contains_key(&mission.id) {
            return Err(StorageError::not_found("mission", mission.id));
        }
        state.missions.insert(mission.id, mission.clone());
        Ok(mission)
    }

    async fn delete_mission(&self, mission_id: Uuid) -> Result<(), StorageError> {
        let mut state = self.state.write().await;
        state
            .missions
            .remove(&mission_id)
            .map(|_| ())
            .ok_or_else(|| StorageError::not_found("mission", mission_id))
    }

    async fn list_missions(&self, filter: &MissionFilter) -> Result<Vec<Mission>, StorageError> {
        let state = self.state.read().await;
        let mut missions: Vec<Mission> = state
            .missions
            .values()
            .filter(|m| filter.matches(m))
            .cloned()
            .collect();
        missions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(missions)
    }

    async fn count_missions(&self) -> Result<u64, StorageError> {
        let state = self.state.read().await;
        Ok(state.missions.len() as u64)
    }

    async fn assign_mission(
        &self,
        mission_id: Uuid,
        technician: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Mission, StorageError> {
        let mut state = self.state.write().await;
        let mission = state
            .missions
            .get_mut(&mission_id)
            .ok_or_else(|| StorageError::not_found("mission", mission_id))?;
        if mission.assigned_technician.is_some() {
            return Err(StorageError::AssignmentConflict {
                mission_id: mission_id.to_string(),
            });
        }
        mission.assigned_technician = Some(technician);
        mission.status = MissionStatus::Assigned;
        mission.sla.stamp(SlaPhase::Assigned, at);
        mission.updated_at = at;
        Ok(mission.clone())
    }

    async fn find_conversation_between(
        &self,
        a: Uuid,
        b: Uuid,
    ) -> Result<Option<Conversation>, StorageError> {
        let state = self.state.read().await;
        Ok(state
            .conversations
            .values()
            .find(|c| c.has_participant(a) && c.has_participant(b))
            .cloned())
    }

    async fn create_conversation(
        &self,
        conversation: Conversation,
    ) -> Result<Conversation, StorageError> {
        let mut state = self.state.write().await;
        state
            .conversations
            .insert(conversation.id, conversation.clone());
        state.messages.entry(conversation.id).or_default();
        Ok(conversation)
    }

    async fn get_conversation(
        &self,
        conversation_id: Uuid,
    ) -> Result<Option<Conversation>, StorageError> {
        let state = self.state.read().await;
        Ok(state.conversations.get(&conversation_id).cloned())
    }

    async fn list_conversations_for(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<Conversation>, StorageError> {
        let state = self.state.read().await;
        let mut conversations: Vec<Conversation> = state
            .conversations
            .values()
            .filter(|c| c.has_participant(user_id))
            .cloned()
            .collect();
        conversations.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(conversations)
    }

    async fn append_message(
        &self,
        conversation_id: Uuid,
        sender: Uuid,
        text: String,
    ) -> Result<(Message, Conversation), StorageError> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;
        let conversation = state
            .conversations
            .get_mut(&conversation_id)
            .ok_or_else(|| StorageError::not_found("conversation", conversation_id))?;

        let message = Message::new(conversation_id, sender, text);
        conversation.last_message = Some(message.id);
        conversation.updated_at = message.created_at;
        for participant in conversation.participants {
            if participant != sender {
                *conversation.unread_counts.entry(participant).or_insert(0) += 1;
            }
        }
        let updated = conversation.clone();

        state.message_index.insert(message.id, conversation_id);
        state
            .messages
            .entry(conversation_id)
            .or_default()
            .push(message.clone());
        Ok((message, updated))
    }

    async fn list_messages(&self, conversation_id: Uuid) -> Result<Vec<Message>, StorageError> {
        let state = self.state.read().await;
        if !state.conversations.contains_key(&conversation_id) {
            return Err(StorageError::not_found("conversation", conversation_id));
        }
        Ok(state
            .messages
            .get(&conversation_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_message(&self, message_id: Uuid) -> Result<Option<Message>, StorageError> {
        let state = self.state.read().await;
        let Some(conversation_id) = state.message_index.get(&message_id) else {
            return Ok(None);
        };
        Ok(state
            .messages
            .get(conversation_id)
            .and_then(|list| list.iter().find(|m| m.id == message_id))
            .cloned())
    }

    async fn update_message_text(
        &self,
        message_id: Uuid,
        text: String,
    ) -> Result<Message, StorageError> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;
        let conversation_id = *state
            .message_index
            .get(&message_id)
            .ok_or_else(|| StorageError::not_found("message", message_id))?;
        let message = state
            .messages
            .get_mut(&conversation_id)
            .and_then(|list| list.iter_mut().find(|m| m.id == message_id))
            .ok_or_else(|| StorageError::not_found("message", message_id))?;
        message.text = text;
        message.edited = true;
        Ok(message.clone())
    }

    async fn delete_message(
        &self,
        message_id: Uuid,
    ) -> Result<(Message, Conversation), StorageError> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;
        let conversation_id = state
            .message_index
            .remove(&message_id)
            .ok_or_else(|| StorageError::not_found("message", message_id))?;
        let list = state
            .messages
            .get_mut(&conversation_id)
            .ok_or_else(|| StorageError::not_found("conversation", conversation_id))?;
        let position = list
            .iter()
            .position(|m| m.id == message_id)
            .ok_or_else(|| StorageError::not_found("message", message_id))?;
        let removed = list.remove(position);
        let newest_remaining = list.last().map(|m| m.id);

        let conversation = state
            .conversations
            .get_mut(&conversation_id)
            .ok_or_else(|| StorageError::not_found("conversation", conversation_id))?;
        if conversation.last_message == Some(message_id) {
            conversation.last_message = newest_remaining;
        }
        Ok((removed, conversation.clone()))
    }

    async fn reset_unread(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> Result<Conversation, StorageError> {
        let mut state = self.state.write().await;
        let conversation = state
            .conversations
            .get_mut(&conversation_id)
            .ok_or_else(|| StorageError::not_found("conversation", conversation_id))?;
        if let Some(count) = conversation.unread_counts.get_mut(&user_id) {
            *count = 0;
        }
        Ok(conversation.clone())
    }

    async fn create_notification(
        &self,
        notification: Notification,
    ) -> Result<Notification, StorageError> {
        let mut state = self.state.write().await;
        state
            .notifications
            .insert(notification.id, notification.clone());
        Ok(notification)
    }

    async fn list_notifications_for(
        &self,
        recipient: Uuid,
    ) -> Result<Vec<Notification>, StorageError> {
        let state = self.state.read().await;
        let mut notifications: Vec<Notification> = state
            .notifications
            .values()
            .filter(|n| n.recipient == recipient)
            .cloned()
            .collect();
        notifications.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(notifications)
    }

    async fn mark_notification_read(
        &self,
        notification_id: Uuid,
        recipient: Uuid,
    ) -> Result<Notification, StorageError> {
        let mut state = self.state.write().await;
        let notification = state
            .notifications
            .get_mut(&notification_id)
            .filter(|n| n.recipient == recipient)
            .ok_or_else(|| StorageError::not_found("notification", notification_id))?;
        notification.read = true;
        Ok(notification.clone())
    }

    async fn get_user(&self, user_id: Uuid) -> Result<Option<User>, StorageError> {
        let state = self.state.read().await;
        Ok(state.users.get(&user_id).cloned())
    }

    async fn upsert_user(&self, user: User) -> Result<User, StorageError> {
        let mut state = self.state.write().await;
        state.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn list_users_by_role(&self, role: Role) -> Result<Vec<User>, StorageError> {
        let state = self.state.read().await;
        let mut users: Vec<User> = state
            .users
            .values()
            .filter(|u| u.role == role)
            .cloned()
            .collect();
        users.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(users)
    }

    async fn add_device_token(&self, user_id: Uuid, token: &str) -> Result<User, StorageError> {
        let mut state = self.state.write().await;
        let user = state
            .users
            .get_mut(&user_id)
            .ok_or_else(|| StorageError::not_found("user", user_id))?;
        if !user.device_tokens.iter().any(|t| t == token) {
            user.device_tokens.push(token.to_string());
        }
        Ok(user.clone())
    }
}
