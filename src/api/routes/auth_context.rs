//! Authentication context utilities.
//!
//! Resolves the bearer token of a request to the calling principal. Token
//! issuance lives in the identity service; this side only validates.

use super::app_state::AppState;
use crate::models::Principal;
use crate::services::jwt_service::JwtService;
use axum::extract::FromRequestParts;
use axum::http::{StatusCode, request::Parts};
use uuid::Uuid;

/// Authenticated caller, extracted from the Authorization header.
#[derive(Clone, Copy, Debug)]
pub struct AuthContext {
    pub principal: Principal,
}

impl FromRequestParts<AppState> for AuthContext {
    type Rejection = StatusCode;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get("authorization")
            .and_then(|h| h.to_str().ok())
            .and_then(JwtService::extract_bearer_token)
            .ok_or_else(|| {
                tracing::warn!("No authorization token provided");
                StatusCode::UNAUTHORIZED
            })?;

        let claims = state.jwt.validate_access_token(token).map_err(|e| {
            tracing::warn!("JWT validation failed: {}", e);
            StatusCode::UNAUTHORIZED
        })?;

        let user_id = Uuid::parse_str(&claims.sub).map_err(|_| {
            tracing::warn!("JWT subject is not a valid id");
            StatusCode::UNAUTHORIZED
        })?;

        // The directory is authoritative for the role; the claim covers
        // principals provisioned outside it.
        let role = match state.storage.get_user(user_id).await {
            Ok(Some(user)) => user.role,
            Ok(None) => claims.role,
            Err(e) => {
                tracing::warn!("role lookup failed: {}", e);
                claims.role
            }
        };

        Ok(AuthContext {
            principal: Principal::new(user_id, role),
        })
    }
}
