//! Live connection registry and room multicast.
//!
//! Maps authenticated principals to their WebSocket connections and fans
//! events out to rooms. A room is either a conversation id (chat multicast)
//! or a principal id (that principal's private notification room, joined
//! automatically on authentication). Presence is process-local and in-memory;
//! it is rebuilt from nothing when the process restarts.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, warn};
use uuid::Uuid;

/// Outbound buffer per connection. A connection that falls this far behind
/// starts losing events (logged, never blocking the emitter).
const EVENT_BUFFER: usize = 64;

/// Events pushed to connected clients, tagged by name on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerEvent {
    NewMessage { payload: Value },
    MessageEdited { payload: Value },
    MessageDeleted { payload: Value },
    Notification { payload: Value },
    UnreadCountUpdated { payload: Value },
}

struct Connection {
    /// Bound after a successful `authenticate`.
    principal: Option<Uuid>,
    sender: mpsc::Sender<Arc<String>>,
}

#[derive(Default)]
struct HubState {
    connections: HashMap<Uuid, Connection>,
    /// Room name -> member connection ids.
    rooms: HashMap<String, HashSet<Uuid>>,
}

/// Connection registry with room-based multicast.
pub struct RealtimeHub {
    state: RwLock<HubState>,
}

impl RealtimeHub {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(HubState::default()),
        }
    }

    /// Register a fresh connection and hand back the receiving end of its
    /// event stream. The socket pump forwards everything received here.
    pub async fn register(&self, connection_id: Uuid) -> mpsc::Receiver<Arc<String>> {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let mut state = self.state.write().await;
        state.connections.insert(
            connection_id,
            Connection {
                principal: None,
                sender: tx,
            },
        );
        rx
    }

    /// Bind a principal to a connection and join its private room. A
    /// principal may hold any number of simultaneous connections.
    pub async fn authenticate(&self, connection_id: Uuid, principal: Uuid) {
        let mut state = self.state.write().await;
        let Some(connection) = state.connections.get_mut(&connection_id) else {
            warn!(%connection_id, "authenticate for unknown connection");
            return;
        };
        connection.principal = Some(principal);
        state
            .rooms
            .entry(principal.to_string())
            .or_default()
            .insert(connection_id);
        debug!(%connection_id, %principal, "connection authenticated");
    }

    /// Add a connection to a room. Unknown connections are ignored.
    pub async fn join(&self, connection_id: Uuid, room: &str) {
        let mut state = self.state.write().await;
        if !state.connections.contains_key(&connection_id) {
            warn!(%connection_id, room, "join for unknown connection");
            return;
        }
        state
            .rooms
            .entry(room.to_string())
            .or_default()
            .insert(connection_id);
    }

    /// Serialize once, deliver to every member of the room. A member whose
    /// buffer is full loses this event; delivery is best-effort.
    pub async fn emit_to_room(&self, room: &str, event: &ServerEvent) {
        let json = match serde_json::to_string(event) {
            Ok(j) => Arc::new(j),
            Err(e) => {
                warn!(error = %e, "failed to serialize realtime event");
                return;
            }
        };
        let state = self.state.read().await;
        let Some(members) = state.rooms.get(room) else {
            return;
        };
        let mut recipients = 0u32;
        for connection_id in members {
            if let Some(connection) = state.connections.get(connection_id) {
                recipients += 1;
                if connection.sender.try_send(Arc::clone(&json)).is_err() {
                    warn!(%connection_id, room, "dropping realtime event (channel full or closed)");
                }
            }
        }
        debug!(room, recipients, "emitted realtime event");
    }

    /// Deliver to every connection of one principal (its private room).
    pub async fn emit_to_user(&self, principal: Uuid, event: &ServerEvent) {
        self.emit_to_room(&principal.to_string(), event).await;
    }

    /// The principal bound to a connection, if it has authenticated.
    pub async fn principal_of(&self, connection_id: Uuid) -> Option<Uuid> {
        let state = self.state.read().await;
        state
            .connections
            .get(&connection_id)
            .and_then(|c| c.principal)
    }

    /// Whether the principal has at least one live connection.
    pub async fn is_user_connected(&self, principal: Uuid) -> bool {
        let state = self.state.read().await;
        state
            .rooms
            .get(&principal.to_string())
            .is_some_and(|members| !members.is_empty())
    }

    /// Whether any of the principal's connections has joined the room.
    pub async fn user_in_room(&self, principal: Uuid, room: &str) -> bool {
        let state = self.state.read().await;
        let Some(members) = state.rooms.get(room) else {
            return false;
        };
        members.iter().any(|id| {
            state
                .connections
                .get(id)
                .is_some_and(|c| c.principal == Some(principal))
        })
    }

    /// Drop one connection. Other connections of the same principal stay
    /// registered.
    pub async fn disconnect(&self, connection_id: Uuid) {
        let mut state = self.state.write().await;
        state.connections.remove(&connection_id);
        state.rooms.retain(|_, members| {
            members.remove(&connection_id);
            !members.is_empty()
        });
    }

    /// Number of live connections, authenticated or not.
    pub async fn connection_count(&self) -> usize {
        let state = self.state.read().await;
        state.connections.len()
    }
}

impl Default for RealtimeHub {
    fn default() -> Self {
        Self::new()
    }
}
