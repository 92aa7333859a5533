//! Application state management.
//!
//! Defines the AppState struct that holds the storage backend and the
//! service graph shared across all route handlers.

use crate::services::chat_service::ChatService;
use crate::services::jwt_service::{JwtService, SharedJwtService};
use crate::services::mission_service::MissionService;
use crate::services::notifier::Notifier;
use crate::services::push::{FcmPushGateway, NoopPushGateway, SharedPushGateway};
use crate::services::realtime_hub::RealtimeHub;
use crate::storage::{MemoryStorageBackend, StorageBackend, StorageError};
use std::sync::Arc;

/// Application state shared across all route handlers.
#[derive(Clone)]
pub struct AppState {
    /// Persisted store (in-memory or PostgreSQL)
    pub storage: Arc<dyn StorageBackend>,
    /// Token validation for the auth extractor and the realtime endpoint
    pub jwt: SharedJwtService,
    /// Live connection registry
    pub hub: Arc<RealtimeHub>,
    /// Multi-channel fan-out
    pub notifier: Arc<Notifier>,
    /// Mission lifecycle operations
    pub missions: Arc<MissionService>,
    /// Conversations and messages
    pub chat: Arc<ChatService>,
}

impl AppState {
    /// Wire the service graph on top of a storage backend.
    pub fn new(
        storage: Arc<dyn StorageBackend>,
        jwt: JwtService,
        push: SharedPushGateway,
    ) -> Self {
        let hub = Arc::new(RealtimeHub::new());
        let notifier = Arc::new(Notifier::new(
            Arc::clone(&storage),
            Arc::clone(&hub),
            push,
        ));
        let missions = Arc::new(MissionService::new(
            Arc::clone(&storage),
            Arc::clone(&notifier),
        ));
        let chat = Arc::new(ChatService::new(
            Arc::clone(&storage),
            Arc::clone(&hub),
            Arc::clone(&notifier),
        ));
        Self {
            storage,
            jwt: Arc::new(jwt),
            hub,
            notifier,
            missions,
            chat,
        }
    }

    /// Build from environment configuration.
    ///
    /// Connects to PostgreSQL and runs migrations when DATABASE_URL is set,
    /// otherwise falls back to the in-memory backend. Push goes through FCM
    /// when FCM_SERVER_KEY is set and is a no-op otherwise.
    pub async fn from_env() -> Result<Self, StorageError> {
        let storage: Arc<dyn StorageBackend> = if let Ok(database_url) =
            std::env::var("DATABASE_URL")
        {
            match sqlx::PgPool::connect(&database_url).await {
                Ok(pool) => {
                    if let Err(e) = sqlx::migrate!("./migrations").run(&pool).await {
                        return Err(StorageError::ConnectionError(format!(
                            "Migration failed: {}",
                            e
                        )));
                    }
                    tracing::info!("using PostgreSQL storage backend");
                    Arc::new(crate::storage::postgres::PostgresStorageBackend::new(pool))
                }
                Err(e) => {
                    return Err(StorageError::ConnectionError(format!(
                        "Failed to connect to database: {}",
                        e
                    )));
                }
            }
        } else {
            tracing::info!("DATABASE_URL not set, using in-memory storage backend");
            Arc::new(MemoryStorageBackend::new())
        };

        let push: SharedPushGateway = match FcmPushGateway::from_env() {
            Some(gateway) => {
                tracing::info!("push notifications enabled via FCM");
                Arc::new(gateway)
            }
            None => {
                tracing::info!("FCM_SERVER_KEY not set, push notifications disabled");
                Arc::new(NoopPushGateway)
            }
        };

        Ok(Self::new(storage, JwtService::from_env(), push))
    }
}
