//! Multi-channel notification fan-out.
//!
//! Every state-changing mission or chat operation ends here. Three channels,
//! in order: a persisted notification row per recipient (the durable,
//! authoritative record), a realtime event to each recipient's private room,
//! and a push multicast for recipients with registered device tokens.
//! Channels two and three are best-effort; a caller can never observe a
//! fan-out failure.

use crate::models::Notification;
use crate::models::enums::NotificationCategory;
use crate::services::push::{PushMessage, PushSummary, SharedPushGateway};
use crate::services::realtime_hub::{RealtimeHub, ServerEvent};
use crate::storage::StorageBackend;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

pub struct Notifier {
    storage: Arc<dyn StorageBackend>,
    hub: Arc<RealtimeHub>,
    push: SharedPushGateway,
}

impl Notifier {
    pub fn new(
        storage: Arc<dyn StorageBackend>,
        hub: Arc<RealtimeHub>,
        push: SharedPushGateway,
    ) -> Self {
        Self { storage, hub, push }
    }

    /// Fan one event out to `recipients`. Duplicate ids in the list are
    /// collapsed; repeated calls for the same logical event are not (delivery
    /// is at-least-once from the caller's point of view). A recipient whose
    /// notification row cannot be written is logged and skipped for the
    /// remaining channels.
    pub async fn notify(
        &self,
        recipients: &[Uuid],
        title: &str,
        body: &str,
        category: NotificationCategory,
        related_id: Option<Uuid>,
    ) {
        let mut seen = HashSet::new();
        let mut device_tokens = Vec::new();

        for &recipient in recipients {
            if !seen.insert(recipient) {
                continue;
            }

            let notification = Notification::new(
                recipient,
                title.to_string(),
                body.to_string(),
                category,
                related_id,
            );
            let persisted = match self.storage.create_notification(notification).await {
                Ok(n) => n,
                Err(e) => {
                    warn!(%recipient, error = %e, "failed to persist notification");
                    continue;
                }
            };

            match serde_json::to_value(&persisted) {
                Ok(payload) => {
                    self.hub
                        .emit_to_user(recipient, &ServerEvent::Notification { payload })
                        .await;
                }
                Err(e) => warn!(%recipient, error = %e, "failed to encode notification event"),
            }

            match self.storage.get_user(recipient).await {
                Ok(Some(user)) => device_tokens.extend(user.device_tokens),
                Ok(None) => {}
                Err(e) => warn!(%recipient, error = %e, "failed to load device tokens"),
            }
        }

        if !device_tokens.is_empty() {
            let message = PushMessage {
                title: title.to_string(),
                body: body.to_string(),
            };
            let outcomes = self.push.send(&device_tokens, &message).await;
            let summary = PushSummary::from_outcomes(&outcomes);
            debug!(
                delivered = summary.delivered,
                failed = summary.failed,
                "push fan-out complete"
            );
        }
    }

    /// Convenience for the common "all managers and admins" audience.
    pub async fn back_office_recipients(&self) -> Vec<Uuid> {
        let mut recipients = Vec::new();
        for role in [
            crate::models::enums::Role::Manager,
            crate::models::enums::Role::Admin,
        ] {
            match self.storage.list_users_by_role(role).await {
                Ok(users) => recipients.extend(users.into_iter().map(|u| u.id)),
                Err(e) => warn!(?role, error = %e, "failed to list fan-out audience"),
            }
        }
        recipients
    }

    /// All technicians, the audience for newly created missions.
    pub async fn technician_recipients(&self) -> Vec<Uuid> {
        match self
            .storage
            .list_users_by_role(crate::models::enums::Role::Technician)
            .await
        {
            Ok(users) => users.into_iter().map(|u| u.id).collect(),
            Err(e) => {
                warn!(error = %e, "failed to list fan-out audience");
                Vec::new()
            }
        }
    }
}
