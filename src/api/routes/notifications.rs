//! Notification routes - the durable fan-out channel and push enrollment.

use axum::{
    Router,
    extract::{Path, State},
    response::Json,
    routing::{get, post, put},
};
use serde::Deserialize;
use serde_json::{Value, json};
use uuid::Uuid;

use super::app_state::AppState;
use super::auth_context::AuthContext;
use super::error::ApiError;

/// Request body for registering a push device token
#[derive(Debug, Deserialize)]
pub struct RegisterTokenRequest {
    pub token: Option<String>,
}

/// Create the notifications router
pub fn notifications_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_notifications))
        .route("/{notification_id}/read", put(mark_notification_read))
}

/// Create the devices router, mounted at /devices
pub fn devices_router() -> Router<AppState> {
    Router::new().route("/token", post(register_device_token))
}

/// GET /notifications - The caller's notifications, newest first
async fn list_notifications(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<Value>, ApiError> {
    let notifications = state
        .storage
        .list_notifications_for(auth.principal.id)
        .await?;
    Ok(Json(json!(notifications)))
}

/// PUT /notifications/{id}/read - Mark one of the caller's notifications read
async fn mark_notification_read(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(notification_id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    let notification = state
        .storage
        .mark_notification_read(notification_id, auth.principal.id)
        .await?;
    Ok(Json(json!(notification)))
}

/// POST /devices/token - Enroll a device for push delivery
async fn register_device_token(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<RegisterTokenRequest>,
) -> Result<Json<Value>, ApiError> {
    let token = req
        .token
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::Validation("token is required".to_string()))?;
    state
        .storage
        .add_device_token(auth.principal.id, &token)
        .await?;
    Ok(Json(json!({"message": "Device token registered"})))
}
