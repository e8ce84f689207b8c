use axum::extract::Request;
use axum::extract::State;
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::IntoResponse;
use axum::response::Response;
use tracing::warn;

use super::client_addr;
use crate::SharedLimiter;

/// Reject the request with 429 when the client's bucket is empty
///
/// Rejected requests never reach the inner service.
pub async fn rate_limit(State(limiter): State<SharedLimiter>, req: Request, next: Next) -> Response {
    let client = client_addr(&req);

    match limiter.check(&client) {
        Ok(()) => next.run(req).await,
        Err(err) => {
            warn!(client = %client, method = %req.method(), path = %req.uri().path(), "{err}");
            (StatusCode::TOO_MANY_REQUESTS, "Too Many Requests").into_response()
        }
    }
}
