//! HTTP parameter pollution guard
//!
//! Repeated query parameters (`?id=1&id=2`) are either rejected or collapsed
//! to a single value before the handler sees the request. Parameters on the
//! allow-list may repeat freely.

use std::collections::HashSet;
use std::sync::Arc;

use axum::extract::Request;
use axum::extract::State;
use axum::http::StatusCode;
use axum::http::Uri;
use axum::http::uri::PathAndQuery;
use axum::middleware::Next;
use axum::response::IntoResponse;
use axum::response::Response;
use serde::Deserialize;
use tracing::debug;
use tracing::warn;
use url::form_urlencoded;

use super::client_addr;

/// What to do with a parameter that appears more than once
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HppMode {
    /// Answer 400 and stop
    #[default]
    Reject,
    KeepFirst,
    KeepLast,
    /// Replace the values with one comma-separated value
    JoinComma,
}

/// The `[hpp]` config section
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct HppConfig {
    pub mode: HppMode,

    /// Parameters that are allowed to repeat, e.g. `tag` for `?tag=a&tag=b`
    pub allow_duplicates: Vec<String>,
}

/// Shared middleware state built from [`HppConfig`]
#[derive(Debug, Clone)]
pub struct HppPolicy {
    mode: HppMode,
    allow_duplicates: Arc<HashSet<String>>,
}

impl HppPolicy {
    pub fn new(config: &HppConfig) -> Self {
        Self { mode: config.mode, allow_duplicates: Arc::new(config.allow_duplicates.iter().cloned().collect()) }
    }

    /// Rewritten query string, or the name of the offending parameter in `Reject` mode
    ///
    /// Parameters keep the order of their first appearance. Returns `Ok(None)`
    /// when nothing repeats and the query can be passed through untouched.
    pub fn sanitize(&self, query: &str) -> Result<Option<String>, String> {
        let mut params: Vec<(String, Vec<String>)> = Vec::new();
        for (key, value) in form_urlencoded::parse(query.as_bytes()) {
            match params.iter_mut().find(|(k, _)| *k == key) {
                Some((_, values)) => values.push(value.into_owned()),
                None => params.push((key.into_owned(), vec![value.into_owned()])),
            }
        }

        if params.iter().all(|(_, values)| values.len() <= 1) {
            return Ok(None);
        }

        let mut serializer = form_urlencoded::Serializer::new(String::new());
        for (key, values) in &params {
            if values.len() <= 1 || self.allow_duplicates.contains(key) {
                for value in values {
                    serializer.append_pair(key, value);
                }
                continue;
            }

            let kept = match self.mode {
                HppMode::Reject => return Err(key.clone()),
                HppMode::KeepFirst => values[0].clone(),
                HppMode::KeepLast => values[values.len() - 1].clone(),
                HppMode::JoinComma => values.join(","),
            };
            debug!(param = %key, ?values, kept = %kept, mode = ?self.mode, "collapsed duplicate parameter");
            serializer.append_pair(key, &kept);
        }

        Ok(Some(serializer.finish()))
    }
}

impl Default for HppPolicy {
    fn default() -> Self {
        Self::new(&HppConfig::default())
    }
}

/// Reject or collapse repeated query parameters
pub async fn hpp(State(policy): State<HppPolicy>, mut req: Request, next: Next) -> Response {
    let Some(query) = req.uri().query() else {
        return next.run(req).await;
    };

    match policy.sanitize(query) {
        Ok(None) => next.run(req).await,
        Ok(Some(cleaned)) => match with_query(req.uri(), &cleaned) {
            Some(uri) => {
                *req.uri_mut() = uri;
                next.run(req).await
            }
            None => (StatusCode::BAD_REQUEST, "Bad Request").into_response(),
        },
        Err(param) => {
            warn!(param = %param, client = %client_addr(&req), path = %req.uri().path(), "duplicate parameter rejected");
            (StatusCode::BAD_REQUEST, "Duplicate parameter detected").into_response()
        }
    }
}

fn with_query(uri: &Uri, query: &str) -> Option<Uri> {
    let mut parts = uri.clone().into_parts();
    let path_and_query = if query.is_empty() { uri.path().to_string() } else { format!("{}?{query}", uri.path()) };
    parts.path_and_query = Some(path_and_query.parse::<PathAndQuery>().ok()?);
    Uri::from_parts(parts).ok()
}
