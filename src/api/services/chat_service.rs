//! Direct messaging between mission parties.
//!
//! Conversations hold exactly two participants. Message append, last-message
//! pointer and unread counters move together in one storage step; this layer
//! adds the authorization checks and the realtime/notification fan-out on
//! top.

use crate::models::enums::NotificationCategory;
use crate::models::{Conversation, Message, Principal};
use crate::routes::error::ApiError;
use crate::services::notifier::Notifier;
use crate::services::realtime_hub::{RealtimeHub, ServerEvent};
use crate::storage::StorageBackend;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

/// Conversation as listed for one caller, annotated with that caller's
/// unread count.
#[derive(Debug, Serialize)]
pub struct ConversationSummary {
    #[serde(flatten)]
    pub conversation: Conversation,
    pub unread_count: u32,
}

pub struct ChatService {
    storage: Arc<dyn StorageBackend>,
    hub: Arc<RealtimeHub>,
    notifier: Arc<Notifier>,
}

impl ChatService {
    pub fn new(
        storage: Arc<dyn StorageBackend>,
        hub: Arc<RealtimeHub>,
        notifier: Arc<Notifier>,
    ) -> Self {
        Self {
            storage,
            hub,
            notifier,
        }
    }

    /// Open the conversation between the caller and `other`, reusing the
    /// existing one regardless of who created it.
    pub async fn create_or_get(
        &self,
        actor: Principal,
        other: Uuid,
    ) -> Result<Conversation, ApiError> {
        if other == actor.id {
            return Err(ApiError::Validation(
                "cannot open a conversation with yourself".to_string(),
            ));
        }
        if self.storage.get_user(other).await?.is_none() {
            return Err(ApiError::NotFound("user".to_string()));
        }

        if let Some(existing) = self.storage.find_conversation_between(actor.id, other).await? {
            return Ok(existing);
        }

        Ok(self
            .storage
            .create_conversation(Conversation::new(actor.id, other))
            .await?)
    }

    /// Append a message and fan it out: `newMessage` to the conversation
    /// room, `unreadCountUpdated` to each recipient's private room, and a
    /// persisted notification for recipients not currently watching the
    /// conversation.
    pub async fn send_message(
        &self,
        actor: Principal,
        conversation_id: Uuid,
        text: &str,
    ) -> Result<(Message, Conversation), ApiError> {
        let conversation = self.get_conversation(conversation_id).await?;
        if !conversation.has_participant(actor.id) {
            return Err(ApiError::Forbidden(
                "not a participant of this conversation".to_string(),
            ));
        }

        let text = text.trim();
        if text.is_empty() {
            return Err(ApiError::Validation("message text is required".to_string()));
        }

        let (message, conversation) = self
            .storage
            .append_message(conversation_id, actor.id, text.to_string())
            .await?;

        let room = conversation_id.to_string();
        self.hub
            .emit_to_room(
                &room,
                &ServerEvent::NewMessage {
                    payload: json!({
                        "conversationId": conversation_id,
                        "message": message,
                    }),
                },
            )
            .await;

        let sender_name = match self.storage.get_user(actor.id).await {
            Ok(Some(user)) => format!("{} {}", user.first_name, user.last_name),
            _ => "Unknown sender".to_string(),
        };

        for participant in conversation.participants {
            if participant == actor.id {
                continue;
            }
            self.hub
                .emit_to_user(
                    participant,
                    &ServerEvent::UnreadCountUpdated {
                        payload: json!({
                            "conversationId": conversation_id,
                            "unreadCount": conversation.unread_for(participant),
                        }),
                    },
                )
                .await;

            // Skip the notification for recipients already watching the
            // conversation; the room multicast reached them.
            if !self.hub.user_in_room(participant, &room).await {
                self.notifier
                    .notify(
                        &[participant],
                        "New message",
                        &format!("{sender_name}: {text}"),
                        NotificationCategory::Message,
                        Some(conversation_id),
                    )
                    .await;
            }
        }

        Ok((message, conversation))
    }

    /// Zero the caller's unread counter and echo the new count to their
    /// private room so other devices of the same account stay in sync.
    pub async fn mark_read(
        &self,
        conversation_id: Uuid,
        actor: Principal,
    ) -> Result<Conversation, ApiError> {
        let conversation = self.get_conversation(conversation_id).await?;
        if !conversation.has_participant(actor.id) {
            return Err(ApiError::Forbidden(
                "not a participant of this conversation".to_string(),
            ));
        }

        let conversation = self.storage.reset_unread(conversation_id, actor.id).await?;

        self.hub
            .emit_to_user(
                actor.id,
                &ServerEvent::UnreadCountUpdated {
                    payload: json!({
                        "conversationId": conversation_id,
                        "unreadCount": 0,
                    }),
                },
            )
            .await;

        Ok(conversation)
    }

    /// Rewrite one's own message and multicast the edit.
    pub async fn edit_message(
        &self,
        message_id: Uuid,
        actor: Principal,
        text: &str,
    ) -> Result<Message, ApiError> {
        let message = self.get_message(message_id).await?;
        if message.sender != actor.id {
            return Err(ApiError::Forbidden(
                "only the sender can edit a message".to_string(),
            ));
        }

        let text = text.trim();
        if text.is_empty() {
            return Err(ApiError::Validation("message text is required".to_string()));
        }

        let message = self
            .storage
            .update_message_text(message_id, text.to_string())
            .await?;

        self.hub
            .emit_to_room(
                &message.conversation_id.to_string(),
                &ServerEvent::MessageEdited {
                    payload: json!({
                        "conversationId": message.conversation_id,
                        "message": message,
                    }),
                },
            )
            .await;

        Ok(message)
    }

    /// Remove one's own message. The conversation's last-message pointer is
    /// recomputed by the storage layer; the multicast carries the new value.
    pub async fn delete_message(
        &self,
        message_id: Uuid,
        actor: Principal,
    ) -> Result<Message, ApiError> {
        let message = self.get_message(message_id).await?;
        if message.sender != actor.id {
            return Err(ApiError::Forbidden(
                "only the sender can delete a message".to_string(),
            ));
        }

        let (message, conversation) = self.storage.delete_message(message_id).await?;

        self.hub
            .emit_to_room(
                &conversation.id.to_string(),
                &ServerEvent::MessageDeleted {
                    payload: json!({
                        "conversationId": conversation.id,
                        "messageId": message.id,
                        "lastMessage": conversation.last_message,
                    }),
                },
            )
            .await;

        Ok(message)
    }

    /// Messages of a conversation in creation order, participants only.
    pub async fn list_messages(
        &self,
        conversation_id: Uuid,
        actor: Principal,
    ) -> Result<Vec<Message>, ApiError> {
        let conversation = self.get_conversation(conversation_id).await?;
        if !conversation.has_participant(actor.id) {
            return Err(ApiError::Forbidden(
                "not a participant of this conversation".to_string(),
            ));
        }
        Ok(self.storage.list_messages(conversation_id).await?)
    }

    /// The caller's conversations, most recent activity first, each carrying
    /// the caller's unread count.
    pub async fn list_conversations(
        &self,
        actor: Principal,
    ) -> Result<Vec<ConversationSummary>, ApiError> {
        let conversations = self.storage.list_conversations_for(actor.id).await?;
        Ok(conversations
            .into_iter()
            .map(|conversation| {
                let unread_count = conversation.unread_for(actor.id);
                ConversationSummary {
                    conversation,
                    unread_count,
                }
            })
            .collect())
    }

    /// Whether the principal participates in the conversation. Used by the
    /// realtime endpoint before honoring a room join.
    pub async fn is_participant(&self, conversation_id: Uuid, principal: Uuid) -> bool {
        match self.storage.get_conversation(conversation_id).await {
            Ok(Some(conversation)) => conversation.has_participant(principal),
            Ok(None) => false,
            Err(e) => {
                warn!(%conversation_id, error = %e, "participant check failed");
                false
            }
        }
    }

    async fn get_conversation(&self, conversation_id: Uuid) -> Result<Conversation, ApiError> {
        self.storage
            .get_conversation(conversation_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("conversation".to_string()))
    }

    async fn get_message(&self, message_id: Uuid) -> Result<Message, ApiError> {
        self.storage
            .get_message(message_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("message".to_string()))
    }
}
