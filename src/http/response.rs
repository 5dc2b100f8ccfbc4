//! Rendering governor outcomes onto HTTP responses.

use axum::http::header::RETRY_AFTER;
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::debug;

use crate::ratelimit::{HeaderPair, Rejection};

#[derive(Debug, Serialize)]
struct RejectionBody<'a> {
    status: u16,
    message: &'a str,
}

/// 429 with `{"status":429,"message":...}`, `Retry-After` and tier headers.
pub fn rejection_response(rejection: &Rejection) -> Response {
    let status = StatusCode::TOO_MANY_REQUESTS;
    let body = RejectionBody {
        status: status.as_u16(),
        message: &rejection.message,
    };

    let mut response = (status, Json(body)).into_response();
    let headers = response.headers_mut();

    if let Some(secs) = rejection.retry_after_secs {
        headers.insert(RETRY_AFTER, HeaderValue::from(secs));
    }
    apply_headers(headers, &rejection.headers);

    response
}

/// Insert governor headers, replacing any existing value.
pub fn apply_headers(headers: &mut HeaderMap, pairs: &[HeaderPair]) {
    for (name, value) in pairs {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                headers.insert(name, value);
            }
            _ => debug!(header = *name, "Skipping invalid rate limit header"),
        }
    }
}
