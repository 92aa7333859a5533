// Models module - mission, chat, notification and user records plus enums

pub mod chat;
pub mod enums;
pub mod mission;
pub mod notification;
pub mod user;

pub use chat::{Conversation, Message};
// Enums are re-exported individually where needed
pub use mission::{MaterialUsed, Mission, Report, SlaTimestamps};
pub use notification::Notification;
pub use user::{Principal, User};
