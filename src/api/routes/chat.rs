//! Chat routes - conversations and messages.

use axum::{
    Router,
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, put},
};
use serde::Deserialize;
use serde_json::{Value, json};
use uuid::Uuid;

use super::app_state::AppState;
use super::auth_context::AuthContext;
use super::error::ApiError;

/// Request body for opening a conversation
#[derive(Debug, Deserialize)]
pub struct CreateConversationRequest {
    pub participant_id: Option<Uuid>,
}

/// Request body for sending or editing a message
#[derive(Debug, Deserialize)]
pub struct MessageBodyRequest {
    pub text: Option<String>,
}

/// Create the chat router
pub fn chat_router() -> Router<AppState> {
    Router::new()
        .route("/", axum::routing::post(create_conversation).get(list_conversations))
        .route(
            "/message/{message_id}",
            put(edit_message).delete(delete_message),
        )
        .route(
            "/{conversation_id}",
            get(list_messages).post(send_message),
        )
}

/// POST /chat - Open (or reuse) the conversation with another principal
async fn create_conversation(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<CreateConversationRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let other = req
        .participant_id
        .ok_or_else(|| ApiError::Validation("participant_id is required".to_string()))?;
    let conversation = state.chat.create_or_get(auth.principal, other).await?;
    Ok((StatusCode::CREATED, Json(json!(conversation))))
}

/// GET /chat - The caller's conversations with unread counts
async fn list_conversations(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<Value>, ApiError> {
    let conversations = state.chat.list_conversations(auth.principal).await?;
    Ok(Json(json!(conversations)))
}

/// GET /chat/{conversationId} - Messages in creation order
async fn list_messages(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(conversation_id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    let messages = state
        .chat
        .list_messages(conversation_id, auth.principal)
        .await?;
    Ok(Json(json!(messages)))
}

/// POST /chat/{conversationId} - Send a message
async fn send_message(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(conversation_id): Path<Uuid>,
    Json(req): Json<MessageBodyRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let text = req
        .text
        .ok_or_else(|| ApiError::Validation("message text is required".to_string()))?;
    let (message, _) = state
        .chat
        .send_message(auth.principal, conversation_id, &text)
        .await?;
    Ok((StatusCode::CREATED, Json(json!(message))))
}

/// PUT /chat/message/{id} - Edit one's own message
async fn edit_message(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(message_id): Path<Uuid>,
    Json(req): Json<MessageBodyRequest>,
) -> Result<Json<Value>, ApiError> {
    let text = req
        .text
        .ok_or_else(|| ApiError::Validation("message text is required".to_string()))?;
    let message = state
        .chat
        .edit_message(message_id, auth.principal, &text)
        .await?;
    Ok(Json(json!(message)))
}

/// DELETE /chat/message/{id} - Delete one's own message
async fn delete_message(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(message_id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    state.chat.delete_message(message_id, auth.principal).await?;
    Ok(Json(json!({"message": "Message deleted"})))
}
