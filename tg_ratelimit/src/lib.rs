pub mod bucket;
pub mod client_key;
pub mod config;
pub mod error;
pub mod limiter;
pub mod registry;
pub mod sweeper;

pub use bucket::TokenBucket;
pub use client_key::normalize;
pub use config::RateLimitConfig;
pub use error::RateLimitError;
pub use error::Result;
pub use limiter::RateLimiter;
pub use registry::ClientRegistry;
pub use registry::ClientRegistryBuilder;
pub use sweeper::Sweeper;
