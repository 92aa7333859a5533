//! WebSocket endpoint for live chat and notification delivery.
//!
//! A connection authenticates either with a `?token=` query parameter or an
//! `authenticate` event carrying the same JWT. Once bound, the principal's
//! private room receives its notifications and unread-count updates;
//! conversation rooms are joined explicitly and only by participants.

use axum::{
    Router,
    extract::{Query, State, WebSocketUpgrade},
    response::Response,
    routing::get,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::app_state::AppState;
use crate::models::Principal;
use crate::models::enums::Role;

/// WebSocket connection query parameters
#[derive(Deserialize)]
struct RealtimeQuery {
    token: Option<String>,
}

/// Events accepted from clients.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientEvent {
    Authenticate {
        token: String,
    },
    #[serde(rename_all = "camelCase")]
    JoinConversation {
        conversation_id: Uuid,
    },
    #[serde(rename_all = "camelCase")]
    SendMessage {
        conversation_id: Uuid,
        text: String,
    },
    #[serde(rename_all = "camelCase")]
    MarkAsRead {
        conversation_id: Uuid,
    },
}

/// Create the realtime router
pub fn realtime_router() -> Router<AppState> {
    Router::new().route("/realtime", get(handle_websocket))
}

/// Handle WebSocket upgrade
async fn handle_websocket(
    Query(query): Query<RealtimeQuery>,
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> Response {
    // Pre-authenticate from the query token when one is supplied; an invalid
    // token still upgrades, the connection just stays anonymous until an
    // authenticate event arrives.
    let pre_auth = query
        .token
        .as_deref()
        .and_then(|token| verify_token(&state, token));

    ws.on_upgrade(move |socket| handle_socket(socket, state, pre_auth))
}

fn verify_token(state: &AppState, token: &str) -> Option<Uuid> {
    match state.jwt.validate_access_token(token) {
        Ok(claims) => Uuid::parse_str(&claims.sub).ok(),
        Err(e) => {
            warn!("realtime token rejected: {}", e);
            None
        }
    }
}

/// Handle WebSocket connection
async fn handle_socket(
    socket: axum::extract::ws::WebSocket,
    state: AppState,
    pre_auth: Option<Uuid>,
) {
    let connection_id = Uuid::new_v4();
    let mut events = state.hub.register(connection_id).await;
    if let Some(principal) = pre_auth {
        state.hub.authenticate(connection_id, principal).await;
    }
    info!(%connection_id, authenticated = pre_auth.is_some(), "realtime connection opened");

    let (mut sender, mut receiver) = socket.split();

    // Forward hub events to this client
    let mut send_task = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            if sender
                .send(axum::extract::ws::Message::Text((*event).clone().into()))
                .await
                .is_err()
            {
                break;
            }
        }
    });

    // Handle events from this client
    let state_for_recv = state.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            if let axum::extract::ws::Message::Text(text) = msg {
                handle_client_event(&text, connection_id, &state_for_recv).await;
            }
        }
    });

    // Wait for either task to complete
    tokio::select! {
        _ = (&mut send_task) => {
            recv_task.abort();
        }
        _ = (&mut recv_task) => {
            send_task.abort();
        }
    }

    state.hub.disconnect(connection_id).await;
    info!(%connection_id, "realtime connection closed");
}

/// Handle one incoming client event
async fn handle_client_event(text: &str, connection_id: Uuid, state: &AppState) {
    let event: ClientEvent = match serde_json::from_str(text) {
        Ok(e) => e,
        Err(e) => {
            debug!(%connection_id, error = %e, "ignoring malformed client event");
            return;
        }
    };

    match event {
        ClientEvent::Authenticate { token } => {
            if let Some(principal) = verify_token(state, &token) {
                state.hub.authenticate(connection_id, principal).await;
            }
        }
        ClientEvent::JoinConversation { conversation_id } => {
            let Some(principal) = state.hub.principal_of(connection_id).await else {
                debug!(%connection_id, "join from unauthenticated connection ignored");
                return;
            };
            // Non-participants are ignored, not errored
            if state.chat.is_participant(conversation_id, principal).await {
                state
                    .hub
                    .join(connection_id, &conversation_id.to_string())
                    .await;
            }
        }
        ClientEvent::SendMessage {
            conversation_id,
            text,
        } => {
            let Some(principal) = resolve_principal(state, connection_id).await else {
                return;
            };
            if let Err(e) = state
                .chat
                .send_message(principal, conversation_id, &text)
                .await
            {
                warn!(%connection_id, error = %e, "realtime send_message failed");
            }
        }
        ClientEvent::MarkAsRead { conversation_id } => {
            let Some(principal) = resolve_principal(state, connection_id).await else {
                return;
            };
            if let Err(e) = state.chat.mark_read(conversation_id, principal).await {
                warn!(%connection_id, error = %e, "realtime mark_read failed");
            }
        }
    }
}

/// Resolve the connection's principal with its directory role. Chat
/// operations authorize by participation, so a missing directory record
/// falls back to the technician role.
async fn resolve_principal(state: &AppState, connection_id: Uuid) -> Option<Principal> {
    let user_id = state.hub.principal_of(connection_id).await?;
    let role = match state.storage.get_user(user_id).await {
        Ok(Some(user)) => user.role,
        _ => Role::Technician,
    };
    Some(Principal::new(user_id, role))
}
