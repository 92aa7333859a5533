//! Services module - mission lifecycle, chat, fan-out and their
//! collaborators.

pub mod chat_service;
pub mod jwt_service;
pub mod mission_service;
pub mod notifier;
pub mod push;
pub mod realtime_hub;

// Re-export for convenience
pub use chat_service::{ChatService, ConversationSummary};
pub use jwt_service::{Claims, JwtService, SharedJwtService, TokenPair, TokenType};
pub use mission_service::{
    CreateMissionRequest, MissionListQuery, MissionService, SubmitReportRequest,
    UpdateMissionRequest,
};
pub use notifier::Notifier;
pub use push::{FcmPushGateway, NoopPushGateway, PushGateway, PushMessage, SharedPushGateway};
pub use realtime_hub::{RealtimeHub, ServerEvent};
