use std::time::Instant;

use axum::body::HttpBody;
use axum::extract::Request;
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::Response;
use tracing::info;

use super::client_addr;

pub const X_RESPONSE_TIME: &str = "x-response-time";
pub const X_RESPONSE_SIZE: &str = "x-response-size";

/// Time the inner service and log the request
///
/// Sets `X-Response-Time` in whole microseconds and, for bodies of known
/// length, `X-Response-Size` in bytes. Streaming bodies get no size header.
pub async fn response_time(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_owned();
    let client = client_addr(&req);

    let mut response = next.run(req).await;
    let elapsed_us = start.elapsed().as_micros() as u64;
    let size = response.body().size_hint().exact();

    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&format!("{elapsed_us}us")) {
        headers.insert(X_RESPONSE_TIME, value);
    }
    if let Some(size) = size
        && let Ok(value) = HeaderValue::from_str(&format!("{size}B"))
    {
        headers.insert(X_RESPONSE_SIZE, value);
    }

    info!(
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        elapsed_us,
        size = ?size,
        client = %client,
        "request served"
    );

    response
}
