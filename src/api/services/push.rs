//! Push delivery to registered devices.
//!
//! [`FcmPushGateway`] multicasts through Firebase Cloud Messaging's legacy
//! HTTP endpoint; [`NoopPushGateway`] stands in when no server key is
//! configured. Push is a courtesy channel: failures are logged per token and
//! never surface to the caller.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};

const DEFAULT_FCM_ENDPOINT: &str = "https://fcm.googleapis.com/fcm/send";

/// One notification to multicast to a set of device tokens.
#[derive(Debug, Clone)]
pub struct PushMessage {
    pub title: String,
    pub body: String,
}

/// Delivery result for a single device token.
#[derive(Debug, Clone)]
pub struct TokenOutcome {
    pub token: String,
    pub delivered: bool,
    pub error: Option<String>,
}

#[async_trait]
pub trait PushGateway: Send + Sync {
    /// Send `message` to every token. Returns one outcome per token, in
    /// input order.
    async fn send(&self, tokens: &[String], message: &PushMessage) -> Vec<TokenOutcome>;
}

pub type SharedPushGateway = Arc<dyn PushGateway>;

/// Gateway used when push is not configured. Logs and reports nothing
/// delivered.
pub struct NoopPushGateway;

#[async_trait]
impl PushGateway for NoopPushGateway {
    async fn send(&self, tokens: &[String], message: &PushMessage) -> Vec<TokenOutcome> {
        debug!(
            tokens = tokens.len(),
            title = %message.title,
            "push gateway disabled, skipping delivery"
        );
        tokens
            .iter()
            .map(|token| TokenOutcome {
                token: token.clone(),
                delivered: false,
                error: Some("push gateway disabled".to_string()),
            })
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct FcmResponse {
    success: u32,
    failure: u32,
    results: Vec<FcmResult>,
}

#[derive(Debug, Deserialize)]
struct FcmResult {
    #[serde(default)]
    error: Option<String>,
}

/// Firebase Cloud Messaging over the legacy HTTP API.
pub struct FcmPushGateway {
    client: reqwest::Client,
    server_key: String,
    endpoint: String,
}

impl FcmPushGateway {
    pub fn new(server_key: String, endpoint: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            server_key,
            endpoint,
        }
    }

    /// Build from `FCM_SERVER_KEY` / `FCM_ENDPOINT`. Returns `None` when no
    /// server key is set, in which case callers fall back to
    /// [`NoopPushGateway`].
    pub fn from_env() -> Option<Self> {
        let server_key = std::env::var("FCM_SERVER_KEY").ok()?;
        if server_key.is_empty() {
            return None;
        }
        let endpoint = std::env::var("FCM_ENDPOINT")
            .unwrap_or_else(|_| DEFAULT_FCM_ENDPOINT.to_string());
        Some(Self::new(server_key, endpoint))
    }
}

#[async_trait]
impl PushGateway for FcmPushGateway {
    async fn send(&self, tokens: &[String], message: &PushMessage) -> Vec<TokenOutcome> {
        if tokens.is_empty() {
            return Vec::new();
        }

        let payload = json!({
            "registration_ids": tokens,
            "notification": {
                "title": message.title,
                "body": message.body,
            },
            "priority": "high",
        });

        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("key={}", self.server_key))
            .json(&payload)
            .send()
            .await;

        let response = match response {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, tokens = tokens.len(), "FCM request failed");
                return all_failed(tokens, &e.to_string());
            }
        };

        if !response.status().is_success() {
            let status = response.status();
            warn!(%status, tokens = tokens.len(), "FCM rejected multicast");
            return all_failed(tokens, &format!("FCM returned {status}"));
        }

        let parsed: FcmResponse = match response.json().await {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "failed to decode FCM response");
                return all_failed(tokens, "unreadable FCM response");
            }
        };

        info!(
            success = parsed.success,
            failure = parsed.failure,
            "FCM multicast complete"
        );

        tokens
            .iter()
            .enumerate()
            .map(|(i, token)| {
                let error = parsed.results.get(i).and_then(|r| r.error.clone());
                if let Some(reason) = &error {
                    warn!(token = %token, reason, "push delivery failed for token");
                }
                TokenOutcome {
                    token: token.clone(),
                    delivered: error.is_none(),
                    error,
                }
            })
            .collect()
    }
}

fn all_failed(tokens: &[String], reason: &str) -> Vec<TokenOutcome> {
    tokens
        .iter()
        .map(|token| TokenOutcome {
            token: token.clone(),
            delivered: false,
            error: Some(reason.to_string()),
        })
        .collect()
}

/// Serializable form of a completed multicast, used in logs and tests.
#[derive(Debug, Serialize)]
pub struct PushSummary {
    pub delivered: usize,
    pub failed: usize,
}

impl PushSummary {
    pub fn from_outcomes(outcomes: &[TokenOutcome]) -> Self {
        let delivered = outcomes.iter().filter(|o| o.delivered).count();
        Self {
            delivered,
            failed: outcomes.len() - delivered,
        }
    }
}
