//! Request representation shared by every transport.
//!
//! # Responsibilities
//! - Carry path, method, headers and optional body into the dispatcher
//! - Convert an inbound Axum request into a relay `Request`
//! - Serialize to/from tunnel frames (body as base64)
//!
//! # Design Decisions
//! - Header names are lowercased so lookups are case-insensitive
//! - Query strings never become part of the path (routes match exact paths)
//! - An empty HTTP body is represented as `None`

use std::collections::BTreeMap;

use http_body_util::LengthLimitError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Header carrying the correlation ID for a request.
pub const X_REQUEST_ID: &str = "x-request-id";

/// A parsed inbound request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    /// Request path, e.g. `/`.
    pub path: String,

    /// HTTP method, uppercase.
    #[serde(default = "default_method")]
    pub method: String,

    /// Request headers with lowercase names.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    /// Raw request body.
    #[serde(default, with = "base64_body", skip_serializing_if = "Option::is_none")]
    pub body: Option<Vec<u8>>,
}

/// Why an inbound HTTP body could not be buffered.
#[derive(Debug, Error)]
pub enum BodyError {
    #[error("request body exceeds {max} bytes")]
    TooLarge { max: usize },

    #[error("failed to read request body: {0}")]
    Read(#[source] axum::Error),
}

impl BodyError {
    fn from_buffering(error: axum::Error, max: usize) -> Self {
        let over_limit = std::error::Error::source(&error)
            .is_some_and(|source| source.is::<LengthLimitError>());
        if over_limit {
            Self::TooLarge { max }
        } else {
            Self::Read(error)
        }
    }
}

fn default_method() -> String {
    "GET".to_string()
}

impl Request {
    /// Create a GET request for the given path with no headers or body.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            method: default_method(),
            headers: BTreeMap::new(),
            body: None,
        }
    }

    /// Set the method (normalized to uppercase).
    pub fn with_method(mut self, method: impl AsRef<str>) -> Self {
        self.method = method.as_ref().to_ascii_uppercase();
        self
    }

    /// Add a header (name normalized to lowercase).
    pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
        self
    }

    /// Set the body. An empty body is stored as `None`.
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        let body = body.into();
        self.body = if body.is_empty() { None } else { Some(body) };
        self
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// The request's correlation ID, if one was supplied.
    pub fn request_id(&self) -> Option<&str> {
        self.header(X_REQUEST_ID)
    }

    /// Build a relay request from an Axum request, buffering at most
    /// `max_body_bytes` of body.
    pub async fn from_http(
        request: axum::extract::Request,
        max_body_bytes: usize,
    ) -> Result<Self, BodyError> {
        let (parts, body) = request.into_parts();

        let headers = parts
            .headers
            .iter()
            .filter_map(|(name, value)| {
                // Non-UTF-8 header values cannot be carried in a string map.
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        let bytes = axum::body::to_bytes(body, max_body_bytes)
            .await
            .map_err(|e| BodyError::from_buffering(e, max_body_bytes))?;

        Ok(Self {
            path: parts.uri.path().to_string(),
            method: parts.method.as_str().to_string(),
            headers,
            body: if bytes.is_empty() { None } else { Some(bytes.to_vec()) },
        })
    }
}

mod base64_body {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(body: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match body {
            Some(bytes) => serializer.serialize_some(&STANDARD.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded: Option<String> = Option::deserialize(deserializer)?;
        encoded
            .map(|s| STANDARD.decode(s).map_err(serde::de::Error::custom))
            .transpose()
    }
}
