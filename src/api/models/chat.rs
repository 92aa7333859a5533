use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Direct conversation between exactly two principals. `unread_counts` always
/// carries one entry per participant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub participants: [Uuid; 2],
    /// Newest non-deleted message, recomputed when that message is deleted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_message: Option<Uuid>,
    pub unread_counts: HashMap<Uuid, u32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn new(a: Uuid, b: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            participants: [a, b],
            last_message: None,
            unread_counts: HashMap::from([(a, 0), (b, 0)]),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn has_participant(&self, user: Uuid) -> bool {
        self.participants.contains(&user)
    }

    pub fn other_participant(&self, user: Uuid) -> Option<Uuid> {
        self.participants.iter().copied().find(|p| *p != user)
    }

    pub fn unread_for(&self, user: Uuid) -> u32 {
        self.unread_counts.get(&user).copied().unwrap_or(0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender: Uuid,
    pub text: String,
    #[serde(default)]
    pub edited: bool,
    /// Assigned at the storage append point; defines the order within the
    /// conversation.
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn new(conversation_id: Uuid, sender: Uuid, text: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            conversation_id,
            sender,
            text,
            edited: false,
            created_at: Utc::now(),
        }
    }
}
