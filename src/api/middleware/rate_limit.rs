//! Rate limiting middleware.
//!
//! Provides rate limiting for API endpoints using the governor crate.

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::Response;
use governor::{Quota, RateLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;

const DEFAULT_REQUESTS_PER_MINUTE: u32 = 300;

/// Rate limiter state
pub type RateLimiterState = Arc<
    RateLimiter<
        governor::state::direct::NotKeyed,
        governor::state::InMemoryState,
        governor::clock::DefaultClock,
    >,
>;

/// Create a rate limiter with custom quota
pub fn create_rate_limiter_with_quota(requests_per_minute: u32) -> RateLimiterState {
    let quota = Quota::per_minute(
        NonZeroU32::new(requests_per_minute)
            .unwrap_or(NonZeroU32::new(DEFAULT_REQUESTS_PER_MINUTE).unwrap()),
    );
    Arc::new(RateLimiter::direct(quota))
}

/// Create a rate limiter from the RATE_LIMIT_PER_MINUTE environment
/// variable, with a generous default.
pub fn create_rate_limiter_from_env() -> RateLimiterState {
    let requests_per_minute = std::env::var("RATE_LIMIT_PER_MINUTE")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_REQUESTS_PER_MINUTE);
    create_rate_limiter_with_quota(requests_per_minute)
}

/// Rate limiting middleware
pub async fn rate_limit_middleware(
    State(limiter): State<RateLimiterState>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    match limiter.check() {
        Ok(_) => Ok(next.run(request).await),
        Err(_) => {
            tracing::warn!("Rate limit exceeded for request: {}", request.uri());
            Err(StatusCode::TOO_MANY_REQUESTS)
        }
    }
}
