// Middleware module - contains cors, rate limiting and observability

pub mod cors;
pub mod observability;
pub mod rate_limit;

// Re-export for convenience
pub use cors::create_cors_layer;
pub use rate_limit::{create_rate_limiter_from_env, rate_limit_middleware};
