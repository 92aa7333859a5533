//! PostgreSQL storage backend implementation.
//!
//! Uses sqlx for database operations and implements the StorageBackend trait.
//! Records are stored as JSONB documents with a handful of indexed columns;
//! assignment exclusivity rides on a conditional UPDATE of the
//! `assigned_technician` column, and per-conversation writes serialize on a
//! `SELECT ... FOR UPDATE` row lock.

use super::{StorageError, traits::*};
use crate::models::enums::{MissionStatus, Role, SlaPhase};
use crate::models::{Conversation, Message, Mission, Notification, User};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use uuid::Uuid;

/// PostgreSQL storage backend implementation.
pub struct PostgresStorageBackend {
    pool: PgPool,
}

impl PostgresStorageBackend {
    /// Create a new PostgreSQL storage backend.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn encode<T: serde::Serialize>(
    entity_type: &str,
    value: &T,
) -> Result<serde_json::Value, StorageError> {
    serde_json::to_value(value)
        .map_err(|e| StorageError::Other(format!("Failed to serialize {}: {}", entity_type, e)))
}

fn decode<T: serde::de::DeserializeOwned>(
    entity_type: &str,
    value: serde_json::Value,
) -> Result<T, StorageError> {
    serde_json::from_value(value)
        .map_err(|e| StorageError::Other(format!("Corrupt {} record: {}", entity_type, e)))
}

fn data_column<T: serde::de::DeserializeOwned>(
    entity_type: &str,
    row: &sqlx::postgres::PgRow,
) -> Result<T, StorageError> {
    let value: serde_json::Value = row
        .try_get("data")
        .map_err(|e| StorageError::Other(format!("Missing data column: {}", e)))?;
    decode(entity_type, value)
}

#[async_trait]
impl StorageBackend for PostgresStorageBackend {
    async fn create_mission(&self, mission: Mission) -> Result<Mission, StorageError> {
        let data = encode("mission", &mission)?;
        sqlx::query(
            r#"
            INSERT INTO missions (id, status, assigned_technician, client, data, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(mission.id)
        .bind(mission.status.as_str())
        .bind(mission.assigned_technician)
        .bind(&mission.client)
        .bind(data)
        .bind(mission.created_at)
        .bind(mission.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::ConnectionError(e.to_string()))?;

        Ok(mission)
    }

    async fn get_mission(&self, mission_id: Uuid) -> Result<Option<Mission>, StorageError> {
        let row = sqlx::query("SELECT data FROM missions WHERE id = $1")
            .bind(mission_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::ConnectionError(e.to_string()))?;

        row.map(|r| data_column("mission", &r)).transpose()
    }

    async fn update_mission(&self, mission: Mission) -> Result<Mission, StorageError> {
        let data = encode("mission", &mission)?;
        let result = sqlx::query(
            r#"
            UPDATE missions
            SET status = $2, assigned_technician = $3, client = $4, data = $5, updated_at = $6
            WHERE id = $1
            "#,
        )
        .bind(mission.id)
        .bind(mission.status.as_str())
        .bind(mission.assigned_technician)
        .bind(&mission.client)
        .bind(data)
        .bind(mission.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::ConnectionError(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(StorageError::not_found("mission", mission.id));
        }
        Ok(mission)
    }

    async fn delete_mission(&self, mission_id: Uuid) -> Result<(), StorageError> {
        let result = sqlx::query("DELETE FROM missions WHERE id = $1")
            .bind(mission_id)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::ConnectionError(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(StorageError::not_found("mission", mission_id));
        }
        Ok(())
    }

    async fn list_missions(&self, filter: &MissionFilter) -> Result<Vec<Mission>, StorageError> {
        let rows = sqlx::query("SELECT data FROM missions ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::ConnectionError(e.to_string()))?;

        let mut missions = Vec::with_capacity(rows.len());
        for row in rows {
            let mission: Mission = data_column("mission", &row)?;
            if filter.matches(&mission) {
                missions.push(mission);
            }
        }
        Ok(missions)
    }

    async fn count_missions(&self) -> Result<u64, StorageError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM missions")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StorageError::ConnectionError(e.to_string()))?;
        Ok(count as u64)
    }

    async fn assign_mission(
        &self,
        mission_id: Uuid,
        technician: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Mission, StorageError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::ConnectionError(e.to_string()))?;

        // The reservation itself: a single conditional write decides the
        // winner, no prior read involved.
        let reserved = sqlx::query(
            r#"
            UPDATE missions
            SET assigned_technician = $2, status = $3, updated_at = $4
            WHERE id = $1 AND assigned_technician IS NULL
            "#,
        )
        .bind(mission_id)
        .bind(technician)
        .bind(MissionStatus::Assigned.as_str())
        .bind(at)
        .execute(&mut *tx)
        .await
        .map_err(|e| StorageError::ConnectionError(e.to_string()))?;

        if reserved.rows_affected() == 0 {
            let exists = sqlx::query("SELECT id FROM missions WHERE id = $1")
                .bind(mission_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| StorageError::ConnectionError(e.to_string()))?;
            return match exists {
                Some(_) => Err(StorageError::AssignmentConflict {
                    mission_id: mission_id.to_string(),
                }),
                None => Err(StorageError::not_found("mission", mission_id)),
            };
        }

        // Row is ours now; bring the JSONB document in line within the same
        // transaction.
        let row = sqlx::query("SELECT data FROM missions WHERE id = $1")
            .bind(mission_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| StorageError::ConnectionError(e.to_string()))?;
        let mut mission: Mission = data_column("mission", &row)?;
        mission.assigned_technician = Some(technician);
        mission.status = MissionStatus::Assigned;
        mission.sla.stamp(SlaPhase::Assigned, at);
        mission.updated_at = at;

        let data = encode("mission", &mission)?;
        sqlx::query("UPDATE missions SET data = $2 WHERE id = $1")
            .bind(mission_id)
            .bind(data)
            .execute(&mut *tx)
            .await
            .map_err(|e| StorageError::ConnectionError(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| StorageError::ConnectionError(e.to_string()))?;
        Ok(mission)
    }

    async fn find_conversation_between(
        &self,
        a: Uuid,
        b: Uuid,
    ) -> Result<Option<Conversation>, StorageError> {
        let row = sqlx::query(
            r#"
            SELECT data FROM conversations
            WHERE (participant_a = $1 AND participant_b = $2)
               OR (participant_a = $2 AND participant_b = $1)
            "#,
        )
        .bind(a)
        .bind(b)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::ConnectionError(e.to_string()))?;

        row.map(|r| data_column("conversation", &r)).transpose()
    }

    async fn create_conversation(
        &self,
        conversation: Conversation,
    ) -> Result<Conversation, StorageError> {
        let data = encode("conversation", &conversation)?;
        sqlx::query(
            r#"
            INSERT INTO conversations (id, participant_a, participant_b, data, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(conversation.id)
        .bind(conversation.participants[0])
        .bind(conversation.participants[1])
        .bind(data)
        .bind(conversation.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::ConnectionError(e.to_string()))?;

        Ok(conversation)
    }

    async fn get_conversation(
        &self,
        conversation_id: Uuid,
    ) -> Result<Option<Conversation>, StorageError> {
        let row = sqlx::query("SELECT data FROM conversations WHERE id = $1")
            .bind(conversation_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::ConnectionError(e.to_string()))?;

        row.map(|r| data_column("conversation", &r)).transpose()
    }

    async fn list_conversations_for(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<Conversation>, StorageError> {
        let rows = sqlx::query(
            r#"
            SELECT data FROM conversations
            WHERE participant_a = $1 OR participant_b = $1
            ORDER BY updated_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::ConnectionError(e.to_string()))?;

        rows.into_iter()
            .map(|r| data_column("conversation", &r))
            .collect()
    }

    async fn append_message(
        &self,
        conversation_id: Uuid,
        sender: Uuid,
        text: String,
    ) -> Result<(Message, Conversation), StorageError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::ConnectionError(e.to_string()))?;

        // Row lock serializes appends per conversation, keeping the message,
        // the last_message pointer and the unread counters consistent.
        let row = sqlx::query("SELECT data FROM conversations WHERE id = $1 FOR UPDATE")
            .bind(conversation_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| StorageError::ConnectionError(e.to_string()))?
            .ok_or_else(|| StorageError::not_found("conversation", conversation_id))?;
        let mut conversation: Conversation = data_column("conversation", &row)?;

        let message = Message::new(conversation_id, sender, text);
        conversation.last_message = Some(message.id);
        conversation.updated_at = message.created_at;
        for participant in conversation.participants {
            if participant != sender {
                *conversation.unread_counts.entry(participant).or_insert(0) += 1;
            }
        }

        let message_data = encode("message", &message)?;
        sqlx::query(
            r#"
            INSERT INTO messages (id, conversation_id, data, created_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(message.id)
        .bind(conversation_id)
        .bind(message_data)
        .bind(message.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| StorageError::ConnectionError(e.to_string()))?;

        let conversation_data = encode("conversation", &conversation)?;
        sqlx::query("UPDATE conversations SET data = $2, updated_at = $3 WHERE id = $1")
            .bind(conversation_id)
            .bind(conversation_data)
            .bind(conversation.updated_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| StorageError::ConnectionError(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| StorageError::ConnectionError(e.to_string()))?;
        Ok((message, conversation))
    }

    async fn list_messages(&self, conversation_id: Uuid) -> Result<Vec<Message>, StorageError> {
        let exists = sqlx::query("SELECT id FROM conversations WHERE id = $1")
            .bind(conversation_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::ConnectionError(e.to_string()))?;
        if exists.is_none() {
            return Err(StorageError::not_found("conversation", conversation_id));
        }

        let rows = sqlx::query(
            r#"
            SELECT data FROM messages
            WHERE conversation_id = $1
            ORDER BY seq ASC
            "#,
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::ConnectionError(e.to_string()))?;

        rows.into_iter()
            .map(|r| data_column("message", &r))
            .collect()
    }

    async fn get_message(&self, message_id: Uuid) -> Result<Option<Message>, StorageError> {
        let row = sqlx::query("SELECT data FROM messages WHERE id = $1")
            .bind(message_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::ConnectionError(e.to_string()))?;

        row.map(|r| data_column("message", &r)).transpose()
    }

    async fn update_message_text(
        &self,
        message_id: Uuid,
        text: String,
    ) -> Result<Message, StorageError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::ConnectionError(e.to_string()))?;

        let row = sqlx::query("SELECT data FROM messages WHERE id = $1 FOR UPDATE")
            .bind(message_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| StorageError::ConnectionError(e.to_string()))?
            .ok_or_else(|| StorageError::not_found("message", message_id))?;
        let mut message: Message = data_column("message", &row)?;
        message.text = text;
        message.edited = true;

        let data = encode("message", &message)?;
        sqlx::query("UPDATE messages SET data = $2 WHERE id = $1")
            .bind(message_id)
            .bind(data)
            .execute(&mut *tx)
            .await
            .map_err(|e| StorageError::ConnectionError(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| StorageError::ConnectionError(e.to_string()))?;
        Ok(message)
    }

    async fn delete_message(
        &self,
        message_id: Uuid,
    ) -> Result<(Message, Conversation), StorageError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::ConnectionError(e.to_string()))?;

        let row = sqlx::query("SELECT conversation_id, data FROM messages WHERE id = $1")
            .bind(message_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| StorageError::ConnectionError(e.to_string()))?
            .ok_or_else(|| StorageError::not_found("message", message_id))?;
        let conversation_id: Uuid = row
            .try_get("conversation_id")
            .map_err(|e| StorageError::Other(e.to_string()))?;
        let removed: Message = data_column("message", &row)?;

        let convo_row = sqlx::query("SELECT data FROM conversations WHERE id = $1 FOR UPDATE")
            .bind(conversation_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| StorageError::ConnectionError(e.to_string()))?
            .ok_or_else(|| StorageError::not_found("conversation", conversation_id))?;
        let mut conversation: Conversation = data_column("conversation", &convo_row)?;

        sqlx::query("DELETE FROM messages WHERE id = $1")
            .bind(message_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| StorageError::ConnectionError(e.to_string()))?;

        if conversation.last_message == Some(message_id) {
            let newest: Option<Uuid> = sqlx::query_scalar(
                r#"
                SELECT id FROM messages
                WHERE conversation_id = $1
                ORDER BY seq DESC
                LIMIT 1
                "#,
            )
            .bind(conversation_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| StorageError::ConnectionError(e.to_string()))?;

            conversation.last_message = newest;
            let data = encode("conversation", &conversation)?;
            sqlx::query("UPDATE conversations SET data = $2 WHERE id = $1")
                .bind(conversation_id)
                .bind(data)
                .execute(&mut *tx)
                .await
                .map_err(|e| StorageError::ConnectionError(e.to_string()))?;
        }

        tx.commit()
            .await
            .map_err(|e| StorageError::ConnectionError(e.to_string()))?;
        Ok((removed, conversation))
    }

    async fn reset_unread(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> Result<Conversation, StorageError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::ConnectionError(e.to_string()))?;

        let row = sqlx::query("SELECT data FROM conversations WHERE id = $1 FOR UPDATE")
            .bind(conversation_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| StorageError::ConnectionError(e.to_string()))?
            .ok_or_else(|| StorageError::not_found("conversation", conversation_id))?;
        let mut conversation: Conversation = data_column("conversation", &row)?;
        if let Some(count) = conversation.unread_counts.get_mut(&user_id) {
            *count = 0;
        }

        let data = encode("conversation", &conversation)?;
        sqlx::query("UPDATE conversations SET data = $2 WHERE id = $1")
            .bind(conversation_id)
            .bind(data)
            .execute(&mut *tx)
            .await
            .map_err(|e| StorageError::ConnectionError(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| StorageError::ConnectionError(e.to_string()))?;
        Ok(conversation)
    }

    async fn create_notification(
        &self,
        notification: Notification,
    ) -> Result<Notification, StorageError> {
        let data = encode("notification", &notification)?;
        sqlx::query(
            r#"
            INSERT INTO notifications (id, recipient, data, created_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(notification.id)
        .bind(notification.recipient)
        .bind(data)
        .bind(notification.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::ConnectionError(e.to_string()))?;

        Ok(notification)
    }

    async fn list_notifications_for(
        &self,
        recipient: Uuid,
    ) -> Result<Vec<Notification>, StorageError> {
        let rows = sqlx::query(
            r#"
            SELECT data FROM notifications
            WHERE recipient = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(recipient)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::ConnectionError(e.to_string()))?;

        rows.into_iter()
            .map(|r| data_column("notification", &r))
            .collect()
    }

    async fn mark_notification_read(
        &self,
        notification_id: Uuid,
        recipient: Uuid,
    ) -> Result<Notification, StorageError> {
        let row = sqlx::query(
            r#"
            UPDATE notifications
            SET data = jsonb_set(data, '{read}', 'true'::jsonb)
            WHERE id = $1 AND recipient = $2
            RETURNING data
            "#,
        )
        .bind(notification_id)
        .bind(recipient)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::ConnectionError(e.to_string()))?
        .ok_or_else(|| StorageError::not_found("notification", notification_id))?;

        data_column("notification", &row)
    }

    async fn get_user(&self, user_id: Uuid) -> Result<Option<User>, StorageError> {
        let row = sqlx::query("SELECT data FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::ConnectionError(e.to_string()))?;

        row.map(|r| data_column("user", &r)).transpose()
    }

    async fn upsert_user(&self, user: User) -> Result<User, StorageError> {
        let data = encode("user", &user)?;
        sqlx::query(
            r#"
            INSERT INTO users (id, role, data, created_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE SET role = $2, data = $3
            "#,
        )
        .bind(user.id)
        .bind(role_str(user.role))
        .bind(data)
        .bind(user.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::ConnectionError(e.to_string()))?;

        Ok(user)
    }

    async fn list_users_by_role(&self, role: Role) -> Result<Vec<User>, StorageError> {
        let rows = sqlx::query(
            r#"
            SELECT data FROM users
            WHERE role = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(role_str(role))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::ConnectionError(e.to_string()))?;

        rows.into_iter().map(|r| data_column("user", &r)).collect()
    }

    async fn add_device_token(&self, user_id: Uuid, token: &str) -> Result<User, StorageError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::ConnectionError(e.to_string()))?;

        let row = sqlx::query("SELECT data FROM users WHERE id = $1 FOR UPDATE")
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| StorageError::ConnectionError(e.to_string()))?
            .ok_or_else(|| StorageError::not_found("user", user_id))?;
        let mut user: User = data_column("user", &row)?;
        if !user.device_tokens.iter().any(|t| t == token) {
            user.device_tokens.push(token.to_string());
        }

        let data = encode("user", &user)?;
        sqlx::query("UPDATE users SET data = $2 WHERE id = $1")
            .bind(user_id)
            .bind(data)
            .execute(&mut *tx)
            .await
            .map_err(|e| StorageError::ConnectionError(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| StorageError::ConnectionError(e.to_string()))?;
        Ok(user)
    }
}

fn role_str(role: Role) -> &'static str {
    match role {
        Role::Manager => "manager",
        Role::Technician => "technician",
        Role::Admin => "admin",
    }
}
