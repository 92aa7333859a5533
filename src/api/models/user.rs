use super::enums::Role;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Directory view of an account. Credential handling lives in the identity
/// service; this record is what dispatch needs: role for authorization and
/// fan-out targeting, device tokens for push.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub role: Role,
    #[serde(default)]
    pub device_tokens: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(first_name: &str, last_name: &str, email: &str, role: Role) -> Self {
        Self {
            id: Uuid::new_v4(),
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            email: email.to_string(),
            role,
            device_tokens: Vec::new(),
            created_at: Utc::now(),
        }
    }
}

/// Authenticated caller identity, resolved from the bearer token by the
/// `AuthContext` extractor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Principal {
    pub id: Uuid,
    pub role: Role,
}

impl Principal {
    pub fn new(id: Uuid, role: Role) -> Self {
        Self { id, role }
    }
}
