use std::time::Duration;

use axum::Router;
use axum::http::HeaderValue;
use axum::http::StatusCode;
use axum::http::header::VARY;
use axum::middleware::from_fn;
use axum::middleware::from_fn_with_state;
use axum::routing::any;
use tower_http::compression::CompressionLayer;
use tower_http::compression::predicate::SizeAbove;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::timeout::TimeoutLayer;

use crate::SharedLimiter;
use crate::middleware::hpp::HppConfig;
use crate::middleware::hpp::HppPolicy;
use crate::middleware::hpp::hpp;
use crate::middleware::rate_limit::rate_limit;
use crate::middleware::response_time::response_time;
use crate::middleware::security_headers::security_headers;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Knobs for the HTTP layer that are not part of the limiter itself
#[derive(Debug, Clone)]
pub struct HttpOptions {
    /// Requests still running after this long get 408
    pub request_timeout: Duration,

    /// Handling of repeated query parameters
    pub hpp: HppConfig,
}

impl HttpOptions {
    pub fn new(request_timeout: Duration, hpp: HppConfig) -> Self {
        Self { request_timeout, hpp }
    }
}

impl Default for HttpOptions {
    fn default() -> Self {
        Self { request_timeout: DEFAULT_REQUEST_TIMEOUT, hpp: HppConfig::default() }
    }
}

async fn root_handler() -> &'static str {
    "Hello Root Route"
}

/// Build the application router around the catch-all handler
pub fn router(limiter: SharedLimiter, options: HttpOptions) -> Router {
    with_middleware(Router::new().route("/", any(root_handler)).fallback(root_handler), limiter, options)
}

/// Wrap `routes` in the middleware stack
///
/// Layers run outermost first: `Vary`, gzip, response time, security headers,
/// timeout, rate limit, parameter pollution guard. Rejections are therefore
/// still timed, logged and carry the security headers, and requests with
/// polluted parameters still spend a token.
pub fn with_middleware(routes: Router, limiter: SharedLimiter, options: HttpOptions) -> Router {
    routes
        .layer(from_fn_with_state(HppPolicy::new(&options.hpp), hpp))
        .layer(from_fn_with_state(limiter, rate_limit))
        .layer(TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, options.request_timeout))
        .layer(from_fn(security_headers))
        .layer(from_fn(response_time))
        .layer(CompressionLayer::new().compress_when(SizeAbove::new(0)))
        .layer(SetResponseHeaderLayer::overriding(VARY, HeaderValue::from_static("accept-encoding")))
}
