//! Response envelope and error mapping for the HTTP boundary.

use axum::{
    http::{HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::cache::CacheMetadata;
use crate::context::RequestContext;
use crate::error::LineageError;

pub const X_CACHE: HeaderName = HeaderName::from_static("x-cache");
pub const X_CACHE_TTL: HeaderName = HeaderName::from_static("x-cache-ttl");

#[derive(Debug, Serialize)]
struct CacheStatus {
    status: &'static str,
    ttl_remaining: i64,
}

impl From<&CacheMetadata> for CacheStatus {
    fn from(metadata: &CacheMetadata) -> Self {
        Self {
            status: metadata.status(),
            ttl_remaining: metadata.ttl_remaining(),
        }
    }
}

#[derive(Debug, Serialize)]
struct Envelope<T> {
    data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    cache: Option<CacheStatus>,
}

/// Wrap `data` in the response envelope. Cache status is reported only when
/// a cached operation ran during the request.
pub fn respond<T: Serialize>(ctx: RequestContext, data: T) -> Response {
    let metadata = ctx.into_metadata();
    let cache = metadata.touched().then(|| CacheStatus::from(&metadata));
    let mut response = Json(Envelope { data, cache }).into_response();

    if metadata.touched() {
        let headers = response.headers_mut();
        headers.insert(X_CACHE, HeaderValue::from_static(metadata.status()));
        headers.insert(X_CACHE_TTL, HeaderValue::from(metadata.ttl_remaining()));
    }
    response
}

/// Error returned from handlers.
#[derive(Debug)]
pub struct ApiError(pub LineageError);

impl ApiError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self(LineageError::InvalidInput(message.into()))
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self(LineageError::NotFound(what.into()))
    }
}

impl From<LineageError> for ApiError {
    fn from(err: LineageError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self.0 {
            LineageError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "invalid_input"),
            LineageError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            LineageError::Cancelled(_) => (StatusCode::GATEWAY_TIMEOUT, "timeout"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };

        if status.is_server_error() {
            log::error!("Request failed: {}", self.0);
        } else {
            log::debug!("Request rejected: {}", self.0);
        }

        (
            status,
            Json(serde_json::json!({
                "error": {
                    "code": code,
                    "message": self.0.to_string(),
                }
            })),
        )
            .into_response()
    }
}
