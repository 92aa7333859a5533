//! Mission routes - lifecycle, assignment and intervention reports.

use axum::{
    Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post, put},
};
use serde::Deserialize;
use serde_json::{Value, json};
use uuid::Uuid;

use super::app_state::AppState;
use super::auth_context::AuthContext;
use super::error::ApiError;
use crate::models::enums::MissionStatus;
use crate::services::mission_service::{
    CreateMissionRequest, MissionListQuery, SubmitReportRequest, UpdateMissionRequest,
};

/// Request body for PUT /missions/{id}/status
#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: Option<String>,
}

/// Create the missions router
pub fn missions_router() -> Router<AppState> {
    // In axum 0.8, path parameters use curly braces {} instead of colons :
    Router::new()
        .route("/", post(create_mission).get(list_missions))
        .route("/available", get(list_available_missions))
        .route(
            "/{mission_id}",
            get(get_mission).put(update_mission).delete(delete_mission),
        )
        .route("/{mission_id}/assign", post(assign_mission))
        .route("/{mission_id}/status", put(update_mission_status))
}

/// Create the reports router, mounted at /rapports
pub fn reports_router() -> Router<AppState> {
    Router::new()
        .route("/{mission_id}", put(submit_report).get(view_report))
        .route("/{mission_id}/valider", post(validate_report))
}

/// POST /missions - Create a mission (back office only)
async fn create_mission(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<CreateMissionRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let mission = state.missions.create(auth.principal, req).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({"message": "Mission created", "mission": mission})),
    ))
}

/// GET /missions - General listing with optional filters
async fn list_missions(
    State(state): State<AppState>,
    _auth: AuthContext,
    Query(query): Query<MissionListQuery>,
) -> Result<Json<Value>, ApiError> {
    let filter = query.into_filter()?;
    let missions = state.missions.list(&filter).await?;
    Ok(Json(json!(missions)))
}

/// GET /missions/available - Missions still waiting for a technician
async fn list_available_missions(
    State(state): State<AppState>,
    _auth: AuthContext,
) -> Result<Json<Value>, ApiError> {
    let missions = state.missions.list_available().await?;
    Ok(Json(json!(missions)))
}

/// GET /missions/{id}
async fn get_mission(
    State(state): State<AppState>,
    _auth: AuthContext,
    Path(mission_id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    let mission = state.missions.get(mission_id).await?;
    Ok(Json(json!(mission)))
}

/// PUT /missions/{id} - Back-office edit
async fn update_mission(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(mission_id): Path<Uuid>,
    Json(req): Json<UpdateMissionRequest>,
) -> Result<Json<Value>, ApiError> {
    let mission = state.missions.update(mission_id, auth.principal, req).await?;
    Ok(Json(json!({"message": "Mission updated", "mission": mission})))
}

/// DELETE /missions/{id}
async fn delete_mission(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(mission_id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    state.missions.delete(mission_id, auth.principal).await?;
    Ok(Json(json!({"message": "Mission deleted"})))
}

/// POST /missions/{id}/assign - Exclusive self-assignment
async fn assign_mission(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(mission_id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    let mission = state.missions.assign(mission_id, auth.principal).await?;
    Ok(Json(json!({"message": "Mission assigned", "mission": mission})))
}

/// PUT /missions/{id}/status - Advance the lifecycle
async fn update_mission_status(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(mission_id): Path<Uuid>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<Json<Value>, ApiError> {
    let target = req
        .status
        .as_deref()
        .and_then(MissionStatus::parse)
        .ok_or_else(|| ApiError::Validation("status is missing or unknown".to_string()))?;
    let mission = state
        .missions
        .advance(mission_id, auth.principal, target)
        .await?;
    Ok(Json(json!({"message": "Status updated", "mission": mission})))
}

/// PUT /rapports/{id} - Submit the intervention report
async fn submit_report(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(mission_id): Path<Uuid>,
    Json(req): Json<SubmitReportRequest>,
) -> Result<Json<Value>, ApiError> {
    let mission = state
        .missions
        .submit_report(mission_id, auth.principal, req)
        .await?;
    Ok(Json(json!({"message": "Report submitted", "mission": mission})))
}

/// GET /rapports/{id} - Read the report (back office only)
async fn view_report(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(mission_id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    let report = state.missions.view_report(mission_id, auth.principal).await?;
    Ok(Json(json!(report)))
}

/// POST /rapports/{id}/valider - Approve the report (back office only)
async fn validate_report(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(mission_id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    let mission = state
        .missions
        .validate_report(mission_id, auth.principal)
        .await?;
    Ok(Json(json!({"message": "Report validated", "mission": mission})))
}
