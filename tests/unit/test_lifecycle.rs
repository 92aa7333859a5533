//! Mission lifecycle unit tests: transition table, exclusive assignment and
//! SLA timestamp capture.

use chrono::{Datelike, Utc};
use field_dispatch_api::models::enums::{MissionStatus, Role};
use field_dispatch_api::models::{Mission, Principal, User};
use field_dispatch_api::routes::{ApiError, AppState};
use field_dispatch_api::services::mission_service::{
    CreateMissionRequest, SubmitReportRequest, UpdateMissionRequest,
};
use field_dispatch_api::services::{JwtService, NoopPushGateway};
use field_dispatch_api::storage::MemoryStorageBackend;
use std::sync::Arc;

const TEST_SECRET: &str = "unit-test-secret-key-0123456789abcdef";

async fn state_with_users() -> (AppState, Principal, Principal, Principal) {
    let state = AppState::new(
        Arc::new(MemoryStorageBackend::new()),
        JwtService::new(TEST_SECRET),
        Arc::new(NoopPushGateway),
    );
    let manager = state
        .storage
        .upsert_user(User::new("Marie", "Durand", "marie@dispatch.test", Role::Manager))
        .await
        .unwrap();
    let tech_a = state
        .storage
        .upsert_user(User::new("Luc", "Martin", "luc@dispatch.test", Role::Technician))
        .await
        .unwrap();
    let tech_b = state
        .storage
        .upsert_user(User::new("Ana", "Silva", "ana@dispatch.test", Role::Technician))
        .await
        .unwrap();
    (
        state,
        Principal::new(manager.id, Role::Manager),
        Principal::new(tech_a.id, Role::Technician),
        Principal::new(tech_b.id, Role::Technician),
    )
}

fn mission_request() -> CreateMissionRequest {
    CreateMissionRequest {
        client: Some("Acme Industries".to_string()),
        address: Some("12 Harbor Road".to_string()),
        risk_level: Some("high".to_string()),
        intervention_type: Some("corrective".to_string()),
        ..Default::default()
    }
}

async fn create_assigned(state: &AppState, manager: Principal, tech: Principal) -> Mission {
    let mission = state.missions.create(manager, mission_request()).await.unwrap();
    state.missions.assign(mission.id, tech).await.unwrap()
}

#[tokio::test]
async fn create_requires_back_office() {
    let (state, _, tech, _) = state_with_users().await;
    let err = state.missions.create(tech, mission_request()).await.unwrap_err();
    assert!(matches!(err, ApiError::Forbidden(_)));
}

#[tokio::test]
async fn create_validates_fields() {
    let (state, manager, _, _) = state_with_users().await;

    let mut req = mission_request();
    req.client = None;
    let err = state.missions.create(manager, req).await.unwrap_err();
    assert!(matches!(err, ApiError::Validation(_)));

    let mut req = mission_request();
    req.risk_level = Some("catastrophic".to_string());
    let err = state.missions.create(manager, req).await.unwrap_err();
    assert!(matches!(err, ApiError::Validation(_)));

    let mut req = mission_request();
    req.intervention_type = None;
    let err = state.missions.create(manager, req).await.unwrap_err();
    assert!(matches!(err, ApiError::Validation(_)));
}

#[tokio::test]
async fn create_generates_sequential_display_ids() {
    let (state, manager, _, _) = state_with_users().await;
    let year = Utc::now().year();

    let first = state.missions.create(manager, mission_request()).await.unwrap();
    let second = state.missions.create(manager, mission_request()).await.unwrap();

    assert_eq!(first.display_id, format!("M-001-{year}"));
    assert_eq!(second.display_id, format!("M-002-{year}"));
    assert_eq!(first.status, MissionStatus::Available);
    assert!(first.sla.assigned.is_none());
}

#[tokio::test]
async fn assign_is_exclusive() {
    let (state, manager, tech_a, tech_b) = state_with_users().await;
    let mission = state.missions.create(manager, mission_request()).await.unwrap();

    let assigned = state.missions.assign(mission.id, tech_a).await.unwrap();
    assert_eq!(assigned.status, MissionStatus::Assigned);
    assert_eq!(assigned.assigned_technician, Some(tech_a.id));
    assert!(assigned.sla.assigned.is_some());

    let err = state.missions.assign(mission.id, tech_b).await.unwrap_err();
    assert!(matches!(err, ApiError::Conflict(_)));

    // The loser changed nothing
    let current = state.missions.get(mission.id).await.unwrap();
    assert_eq!(current.assigned_technician, Some(tech_a.id));
}

#[tokio::test]
async fn concurrent_assigns_have_single_winner() {
    let (state, manager, tech_a, tech_b) = state_with_users().await;
    let mission = state.missions.create(manager, mission_request()).await.unwrap();

    let (first, second) = tokio::join!(
        state.missions.assign(mission.id, tech_a),
        state.missions.assign(mission.id, tech_b),
    );

    assert_eq!(
        first.is_ok() as u8 + second.is_ok() as u8,
        1,
        "exactly one assign wins"
    );

    let current = state.missions.get(mission.id).await.unwrap();
    assert_eq!(current.status, MissionStatus::Assigned);
    let winner = if first.is_ok() { tech_a.id } else { tech_b.id };
    assert_eq!(current.assigned_technician, Some(winner));
}

#[tokio::test]
async fn assign_requires_technician_role() {
    let (state, manager, _, _) = state_with_users().await;
    let mission = state.missions.create(manager, mission_request()).await.unwrap();

    let err = state.missions.assign(mission.id, manager).await.unwrap_err();
    assert!(matches!(err, ApiError::Forbidden(_)));
}

#[tokio::test]
async fn advance_rejects_non_assignee() {
    let (state, manager, tech_a, tech_b) = state_with_users().await;
    let mission = create_assigned(&state, manager, tech_a).await;

    let err = state
        .missions
        .advance(mission.id, tech_b, MissionStatus::EnRoute)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Forbidden(_)));

    let err = state
        .missions
        .advance(mission.id, manager, MissionStatus::EnRoute)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Forbidden(_)));
}

#[tokio::test]
async fn advance_rejects_non_successor_targets() {
    let (state, manager, tech, _) = state_with_users().await;
    let mission = create_assigned(&state, manager, tech).await;

    // Skipping en_route
    let err = state
        .missions
        .advance(mission.id, tech, MissionStatus::OnSite)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Validation(_)));

    // Jumping straight to completed
    let err = state
        .missions
        .advance(mission.id, tech, MissionStatus::Completed)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Validation(_)));

    // Going backwards
    let err = state
        .missions
        .advance(mission.id, tech, MissionStatus::Available)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Validation(_)));
}

#[tokio::test]
async fn full_lifecycle_stamps_every_phase_in_order() {
    let (state, manager, tech, _) = state_with_users().await;
    let mission = create_assigned(&state, manager, tech).await;

    for target in [
        MissionStatus::EnRoute,
        MissionStatus::OnSite,
        MissionStatus::InProgress,
        MissionStatus::Completed,
    ] {
        state.missions.advance(mission.id, tech, target).await.unwrap();
    }

    let done = state.missions.get(mission.id).await.unwrap();
    assert_eq!(done.status, MissionStatus::Completed);
    assert!(done.completed);

    let assigned = done.sla.assigned.unwrap();
    let en_route = done.sla.en_route.unwrap();
    let on_site = done.sla.on_site.unwrap();
    let in_progress = done.sla.in_progress.unwrap();
    let completed = done.sla.completed.unwrap();
    assert!(assigned <= en_route);
    assert!(en_route <= on_site);
    assert!(on_site <= in_progress);
    assert!(in_progress <= completed);

    // Completed is terminal
    let err = state
        .missions
        .advance(mission.id, tech, MissionStatus::InProgress)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Validation(_)));
}

#[tokio::test]
async fn awaiting_parts_round_trip_keeps_first_in_progress_stamp() {
    let (state, manager, tech, _) = state_with_users().await;
    let mission = create_assigned(&state, manager, tech).await;

    state.missions.advance(mission.id, tech, MissionStatus::EnRoute).await.unwrap();
    state.missions.advance(mission.id, tech, MissionStatus::OnSite).await.unwrap();
    let first = state
        .missions
        .advance(mission.id, tech, MissionStatus::InProgress)
        .await
        .unwrap();
    let first_stamp = first.sla.in_progress.unwrap();

    state
        .missions
        .advance(mission.id, tech, MissionStatus::AwaitingParts)
        .await
        .unwrap();
    let resumed = state
        .missions
        .advance(mission.id, tech, MissionStatus::InProgress)
        .await
        .unwrap();

    assert_eq!(resumed.sla.in_progress.unwrap(), first_stamp);
    assert_eq!(resumed.status, MissionStatus::InProgress);
}

#[tokio::test]
async fn report_submit_and_validate_flow() {
    let (state, manager, tech, other) = state_with_users().await;
    let mission = create_assigned(&state, manager, tech).await;

    // Validation before any report is a conflict
    let err = state.missions.validate_report(mission.id, manager).await.unwrap_err();
    assert!(matches!(err, ApiError::Conflict(_)));

    // Only the assignee may submit
    let req = SubmitReportRequest {
        work_performed: Some("Replaced the coolant pump".to_string()),
        resolution_status: Some("resolved".to_string()),
        ..Default::default()
    };
    let err = state
        .missions
        .submit_report(mission.id, other, SubmitReportRequest::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Forbidden(_)));

    let submitted = state.missions.submit_report(mission.id, tech, req).await.unwrap();
    let report = submitted.report.as_ref().unwrap();
    assert!(!report.validated);
    let first_stamp = submitted.sla.report_submitted.unwrap();

    // Resubmission replaces content but keeps the first stamp
    let resubmitted = state
        .missions
        .submit_report(
            mission.id,
            tech,
            SubmitReportRequest {
                work_performed: Some("Replaced pump and flushed circuit".to_string()),
                resolution_status: Some("partially_resolved".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(resubmitted.sla.report_submitted.unwrap(), first_stamp);
    assert!(!resubmitted.report.as_ref().unwrap().validated);

    // Back office reads and validates
    let viewed = state.missions.view_report(mission.id, manager).await.unwrap();
    assert_eq!(viewed.work_performed, "Replaced pump and flushed circuit");

    let err = state.missions.view_report(mission.id, tech).await.unwrap_err();
    assert!(matches!(err, ApiError::Forbidden(_)));

    let validated = state.missions.validate_report(mission.id, manager).await.unwrap();
    assert!(validated.report.unwrap().validated);
}

#[tokio::test]
async fn report_requires_work_performed() {
    let (state, manager, tech, _) = state_with_users().await;
    let mission = create_assigned(&state, manager, tech).await;

    let err = state
        .missions
        .submit_report(
            mission.id,
            tech,
            SubmitReportRequest {
                resolution_status: Some("resolved".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Validation(_)));
}

#[tokio::test]
async fn update_override_to_completed_stamps_sla() {
    let (state, manager, tech, _) = state_with_users().await;
    let mission = create_assigned(&state, manager, tech).await;

    let updated = state
        .missions
        .update(
            mission.id,
            manager,
            UpdateMissionRequest {
                status: Some("completed".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(updated.status, MissionStatus::Completed);
    assert!(updated.completed);
    assert!(updated.sla.completed.is_some());
}

#[tokio::test]
async fn update_requires_back_office() {
    let (state, manager, tech, _) = state_with_users().await;
    let mission = create_assigned(&state, manager, tech).await;

    let err = state
        .missions
        .update(mission.id, tech, UpdateMissionRequest::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Forbidden(_)));
}

#[tokio::test]
async fn delete_removes_mission() {
    let (state, manager, _, _) = state_with_users().await;
    let mission = state.missions.create(manager, mission_request()).await.unwrap();

    state.missions.delete(mission.id, manager).await.unwrap();

    let err = state.missions.get(mission.id).await.unwrap_err();
    assert!(matches!(err, ApiError::NotFound(_)));
}

#[tokio::test]
async fn list_available_excludes_assigned_missions() {
    let (state, manager, tech, _) = state_with_users().await;
    let open = state.missions.create(manager, mission_request()).await.unwrap();
    let taken = state.missions.create(manager, mission_request()).await.unwrap();
    state.missions.assign(taken.id, tech).await.unwrap();

    let available = state.missions.list_available().await.unwrap();
    assert_eq!(available.len(), 1);
    assert_eq!(available[0].id, open.id);
}
