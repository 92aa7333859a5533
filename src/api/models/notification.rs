use super::enums::NotificationCategory;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Persisted notification, the durable fan-out channel. Written only by the
/// notifier; the recipient may mark it read, nothing deletes it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub recipient: Uuid,
    pub title: String,
    pub body: String,
    pub category: NotificationCategory,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub related_id: Option<Uuid>,
    #[serde(default)]
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(
        recipient: Uuid,
        title: String,
        body: String,
        category: NotificationCategory,
        related_id: Option<Uuid>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            recipient,
            title,
            body,
            category,
            related_id,
            read: false,
            created_at: Utc::now(),
        }
    }
}
