//! Request middleware
//!
//! Rate limiting, parameter pollution guard, security headers and
//! response-time logging.

pub mod hpp;
pub mod rate_limit;
pub mod response_time;
pub mod security_headers;

use std::net::SocketAddr;

use axum::extract::ConnectInfo;
use axum::extract::Request;

/// Key used when the server was not started with connect info
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Remote address of the connection that sent `req`
pub(crate) fn client_addr(req: &Request) -> String {
    req.extensions().get::<ConnectInfo<SocketAddr>>().map(|ConnectInfo(addr)| addr.to_string()).unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}
