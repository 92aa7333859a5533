//! Storage backend unit tests against the in-memory implementation: the
//! assignment test-and-set, the single-step message append and the pointer
//! recomputation on delete.

use chrono::Utc;
use field_dispatch_api::models::enums::{MissionStatus, RiskLevel, Role};
use field_dispatch_api::models::{Conversation, Mission, Notification, User};
use field_dispatch_api::storage::{
    MemoryStorageBackend, MissionFilter, StorageBackend, StorageError,
};
use std::sync::Arc;
use uuid::Uuid;

fn backend() -> Arc<dyn StorageBackend> {
    Arc::new(MemoryStorageBackend::new())
}

fn sample_mission(client: &str) -> Mission {
    Mission::new(
        Mission::display_id_for(1),
        client.to_string(),
        "5 Dock Street".to_string(),
        RiskLevel::Medium,
        field_dispatch_api::models::enums::InterventionType::Preventive,
        Uuid::new_v4(),
    )
}

#[tokio::test]
async fn assign_mission_is_a_test_and_set() {
    let storage = backend();
    let mission = storage.create_mission(sample_mission("Acme")).await.unwrap();
    let tech_a = Uuid::new_v4();
    let tech_b = Uuid::new_v4();

    let won = storage
        .assign_mission(mission.id, tech_a, Utc::now())
        .await
        .unwrap();
    assert_eq!(won.assigned_technician, Some(tech_a));
    assert_eq!(won.status, MissionStatus::Assigned);
    assert!(won.sla.assigned.is_some());

    let lost = storage.assign_mission(mission.id, tech_b, Utc::now()).await;
    assert!(matches!(lost, Err(StorageError::AssignmentConflict { .. })));

    let current = storage.get_mission(mission.id).await.unwrap().unwrap();
    assert_eq!(current.assigned_technician, Some(tech_a));
}

#[tokio::test]
async fn concurrent_assigns_produce_one_winner_one_conflict() {
    let storage = backend();
    let mission = storage.create_mission(sample_mission("Acme")).await.unwrap();
    let tech_a = Uuid::new_v4();
    let tech_b = Uuid::new_v4();

    let (first, second) = tokio::join!(
        storage.assign_mission(mission.id, tech_a, Utc::now()),
        storage.assign_mission(mission.id, tech_b, Utc::now()),
    );

    let winners = first.is_ok() as u8 + second.is_ok() as u8;
    assert_eq!(winners, 1);
    let conflicts = matches!(first, Err(StorageError::AssignmentConflict { .. })) as u8
        + matches!(second, Err(StorageError::AssignmentConflict { .. })) as u8;
    assert_eq!(conflicts, 1);
}

#[tokio::test]
async fn assign_unknown_mission_is_not_found() {
    let storage = backend();
    let result = storage
        .assign_mission(Uuid::new_v4(), Uuid::new_v4(), Utc::now())
        .await;
    assert!(matches!(result, Err(StorageError::NotFound { .. })));
}

#[tokio::test]
async fn append_message_moves_pointer_and_counters_together() {
    let storage = backend();
    let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
    let conversation = storage
        .create_conversation(Conversation::new(alice, bob))
        .await
        .unwrap();

    let (first, after_first) = storage
        .append_message(conversation.id, alice, "hello".to_string())
        .await
        .unwrap();
    assert_eq!(after_first.last_message, Some(first.id));
    assert_eq!(after_first.unread_for(bob), 1);
    assert_eq!(after_first.unread_for(alice), 0);

    let (second, after_second) = storage
        .append_message(conversation.id, alice, "anyone there?".to_string())
        .await
        .unwrap();
    assert_eq!(after_second.last_message, Some(second.id));
    assert_eq!(after_second.unread_for(bob), 2);

    let messages = storage.list_messages(conversation.id).await.unwrap();
    assert_eq!(messages.len(), 2);
    assert!(messages[0].created_at <= messages[1].created_at);
    assert_eq!(messages[0].id, first.id);
}

#[tokio::test]
async fn delete_message_recomputes_last_pointer() {
    let storage = backend();
    let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
    let conversation = storage
        .create_conversation(Conversation::new(alice, bob))
        .await
        .unwrap();

    let (m1, _) = storage
        .append_message(conversation.id, alice, "one".to_string())
        .await
        .unwrap();
    let (m2, _) = storage
        .append_message(conversation.id, bob, "two".to_string())
        .await
        .unwrap();
    let (m3, _) = storage
        .append_message(conversation.id, alice, "three".to_string())
        .await
        .unwrap();

    // Deleting the newest falls back to the next newest
    let (_, after) = storage.delete_message(m3.id).await.unwrap();
    assert_eq!(after.last_message, Some(m2.id));

    // Deleting a non-last message leaves the pointer alone
    let (_, after) = storage.delete_message(m1.id).await.unwrap();
    assert_eq!(after.last_message, Some(m2.id));

    // Deleting the final message clears it
    let (_, after) = storage.delete_message(m2.id).await.unwrap();
    assert_eq!(after.last_message, None);
    assert!(storage.list_messages(conversation.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn reset_unread_zeroes_only_the_reader() {
    let storage = backend();
    let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
    let conversation = storage
        .create_conversation(Conversation::new(alice, bob))
        .await
        .unwrap();

    storage
        .append_message(conversation.id, alice, "ping".to_string())
        .await
        .unwrap();
    let (_, with_unread) = storage
        .append_message(conversation.id, bob, "pong".to_string())
        .await
        .unwrap();
    assert_eq!(with_unread.unread_for(alice), 1);
    assert_eq!(with_unread.unread_for(bob), 1);

    let after = storage.reset_unread(conversation.id, bob).await.unwrap();
    assert_eq!(after.unread_for(bob), 0);
    assert_eq!(after.unread_for(alice), 1);
}

#[tokio::test]
async fn update_message_text_flags_edited() {
    let storage = backend();
    let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
    let conversation = storage
        .create_conversation(Conversation::new(alice, bob))
        .await
        .unwrap();
    let (message, _) = storage
        .append_message(conversation.id, alice, "draft".to_string())
        .await
        .unwrap();
    assert!(!message.edited);

    let edited = storage
        .update_message_text(message.id, "final".to_string())
        .await
        .unwrap();
    assert_eq!(edited.text, "final");
    assert!(edited.edited);
}

#[tokio::test]
async fn find_conversation_between_ignores_order() {
    let storage = backend();
    let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
    let created = storage
        .create_conversation(Conversation::new(alice, bob))
        .await
        .unwrap();

    let forward = storage.find_conversation_between(alice, bob).await.unwrap();
    let reverse = storage.find_conversation_between(bob, alice).await.unwrap();
    assert_eq!(forward.unwrap().id, created.id);
    assert_eq!(reverse.unwrap().id, created.id);

    let none = storage
        .find_conversation_between(alice, Uuid::new_v4())
        .await
        .unwrap();
    assert!(none.is_none());
}

#[tokio::test]
async fn conversations_list_most_recent_activity_first() {
    let storage = backend();
    let alice = Uuid::new_v4();
    let older = storage
        .create_conversation(Conversation::new(alice, Uuid::new_v4()))
        .await
        .unwrap();
    let newer = storage
        .create_conversation(Conversation::new(alice, Uuid::new_v4()))
        .await
        .unwrap();

    // A message in the older conversation makes it the most recent
    storage
        .append_message(older.id, alice, "bump".to_string())
        .await
        .unwrap();

    let list = storage.list_conversations_for(alice).await.unwrap();
    assert_eq!(list.len(), 2);
    assert_eq!(list[0].id, older.id);
    assert_eq!(list[1].id, newer.id);
}

#[tokio::test]
async fn notifications_are_listed_newest_first_and_scoped() {
    let storage = backend();
    let (recipient, stranger) = (Uuid::new_v4(), Uuid::new_v4());

    let first = storage
        .create_notification(Notification::new(
            recipient,
            "First".to_string(),
            "body".to_string(),
            field_dispatch_api::models::enums::NotificationCategory::System,
            None,
        ))
        .await
        .unwrap();
    let second = storage
        .create_notification(Notification::new(
            recipient,
            "Second".to_string(),
            "body".to_string(),
            field_dispatch_api::models::enums::NotificationCategory::System,
            None,
        ))
        .await
        .unwrap();

    let list = storage.list_notifications_for(recipient).await.unwrap();
    assert_eq!(list.len(), 2);
    assert_eq!(list[0].id, second.id);
    assert_eq!(list[1].id, first.id);

    // Only the recipient can mark it read
    let denied = storage.mark_notification_read(first.id, stranger).await;
    assert!(matches!(denied, Err(StorageError::NotFound { .. })));

    let read = storage.mark_notification_read(first.id, recipient).await.unwrap();
    assert!(read.read);
}

#[tokio::test]
async fn device_tokens_are_deduplicated() {
    let storage = backend();
    let user = storage
        .upsert_user(User::new("Luc", "Martin", "luc@dispatch.test", Role::Technician))
        .await
        .unwrap();

    storage.add_device_token(user.id, "token-1").await.unwrap();
    storage.add_device_token(user.id, "token-1").await.unwrap();
    let updated = storage.add_device_token(user.id, "token-2").await.unwrap();

    assert_eq!(updated.device_tokens, vec!["token-1", "token-2"]);
}

#[tokio::test]
async fn list_users_by_role_targets_audiences() {
    let storage = backend();
    storage
        .upsert_user(User::new("Marie", "Durand", "m@dispatch.test", Role::Manager))
        .await
        .unwrap();
    storage
        .upsert_user(User::new("Luc", "Martin", "l@dispatch.test", Role::Technician))
        .await
        .unwrap();
    storage
        .upsert_user(User::new("Ana", "Silva", "a@dispatch.test", Role::Technician))
        .await
        .unwrap();

    assert_eq!(storage.list_users_by_role(Role::Technician).await.unwrap().len(), 2);
    assert_eq!(storage.list_users_by_role(Role::Manager).await.unwrap().len(), 1);
    assert!(storage.list_users_by_role(Role::Admin).await.unwrap().is_empty());
}

#[tokio::test]
async fn mission_filter_combines_criteria() {
    let storage = backend();
    let mut industrial = sample_mission("Nordic Industrial Group");
    industrial.risk_level = RiskLevel::Critical;
    let industrial = storage.create_mission(industrial).await.unwrap();
    storage.create_mission(sample_mission("Bakery Soleil")).await.unwrap();

    // Case-insensitive client substring
    let filter = MissionFilter {
        client: Some("industrial".to_string()),
        ..MissionFilter::default()
    };
    let hits = storage.list_missions(&filter).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, industrial.id);

    let filter = MissionFilter {
        client: Some("industrial".to_string()),
        risk_level: Some(RiskLevel::Low),
        ..MissionFilter::default()
    };
    assert!(storage.list_missions(&filter).await.unwrap().is_empty());

    let technician = Uuid::new_v4();
    storage
        .assign_mission(industrial.id, technician, Utc::now())
        .await
        .unwrap();
    let filter = MissionFilter {
        technician: Some(technician),
        ..MissionFilter::default()
    };
    assert_eq!(storage.list_missions(&filter).await.unwrap().len(), 1);
}

#[tokio::test]
async fn count_missions_tracks_creations() {
    let storage = backend();
    assert_eq!(storage.count_missions().await.unwrap(), 0);
    storage.create_mission(sample_mission("Acme")).await.unwrap();
    storage.create_mission(sample_mission("Globex")).await.unwrap();
    assert_eq!(storage.count_missions().await.unwrap(), 2);
}
