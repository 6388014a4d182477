//! Response representation and rendering.
//!
//! # Responsibilities
//! - Define the structured `Response` produced by handlers
//! - Provide the canonical not-found, internal-error and timeout responses
//! - Render a `Response` as an Axum HTTP response
//!
//! # Design Decisions
//! - Error bodies carry a fixed marker only, never handler error text
//! - An empty body renders as zero bytes, not `{}`
//! - Out-of-range status codes render as 500

use std::collections::BTreeMap;

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::IntoResponse;
use serde::{Deserialize, Serialize};

/// Structured response body: a flat string map.
pub type ResponseBody = BTreeMap<String, String>;

/// A handler-produced response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    /// HTTP status code.
    pub status: u16,

    /// Response body.
    #[serde(default)]
    pub body: ResponseBody,
}

impl Response {
    /// Create a response with the given status and body entries.
    pub fn new<I, K, V>(status: u16, body: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            status,
            body: body
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Create a 200 OK response.
    pub fn ok<I, K, V>(body: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self::new(200, body)
    }

    /// Create a response with an empty body.
    pub fn empty(status: u16) -> Self {
        Self {
            status,
            body: ResponseBody::new(),
        }
    }

    /// 404 with an empty body.
    pub fn not_found() -> Self {
        Self::empty(404)
    }

    /// 500 with an opaque error marker.
    pub fn internal_error() -> Self {
        Self::new(500, [("error", "Internal Server Error")])
    }

    /// 504 with an opaque error marker.
    pub fn gateway_timeout() -> Self {
        Self::new(504, [("error", "Gateway Timeout")])
    }

    /// 413 with an opaque error marker.
    pub fn payload_too_large() -> Self {
        Self::new(413, [("error", "Payload Too Large")])
    }

    /// 400 with an opaque error marker.
    pub fn bad_request() -> Self {
        Self::new(400, [("error", "Bad Request")])
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

impl IntoResponse for Response {
    fn into_response(self) -> axum::response::Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if self.body.is_empty() {
            return status.into_response();
        }

        match serde_json::to_vec(&self.body) {
            Ok(bytes) => (
                status,
                [(header::CONTENT_TYPE, HeaderValue::from_static("application/json"))],
                bytes,
            )
                .into_response(),
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize response body");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}
