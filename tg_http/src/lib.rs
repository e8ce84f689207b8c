//! # tg_http
//!
//! HTTP pipeline that puts the per-client rate limiter in front of the API

pub mod middleware;
pub mod router;

use std::sync::Arc;

use tg_ratelimit::RateLimiter;

pub use middleware::hpp::HppConfig;
pub use middleware::hpp::HppMode;
pub use router::HttpOptions;
pub use router::router;
pub use router::with_middleware;

/// Limiter shared by every request task
pub type SharedLimiter = Arc<dyn RateLimiter>;
