//! API routes module - organizes all route handlers.

pub mod app_state;
pub mod auth_context;
pub mod chat;
pub mod error;
pub mod missions;
pub mod notifications;
pub mod realtime;

use axum::Router;
pub use app_state::AppState;
pub use auth_context::AuthContext;
pub use error::ApiError;

/// Create the main API router combining all route modules
///
/// Note: State is applied by callers (e.g., TestServer); for production use,
/// call .with_state(app_state) after creating the router.
pub fn create_api_router() -> Router<AppState> {
    Router::new()
        .nest("/missions", missions::missions_router())
        .nest("/rapports", missions::reports_router())
        .nest("/chat", chat::chat_router())
        .nest("/notifications", notifications::notifications_router())
        .nest("/devices", notifications::devices_router())
        .merge(realtime::realtime_router())
}
