use bytes::Bytes;
use reqwest::Method;
use std::fmt;

use super::http_client::Response;

/// Possible error types while talking to Keycloak.
#[derive(thiserror::Error, Debug)]
pub enum KeycloakError {
    /// The configured base URL could not be parsed.
    #[error("invalid base URL '{url}': {source}")]
    InvalidBaseUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    /// A relative path could not be resolved against the base URL.
    #[error("failed to resolve '{path}' against the base URL: {source}")]
    UrlResolution {
        path: String,
        #[source]
        source: url::ParseError,
    },

    /// A caller-supplied id would not stay a single path segment.
    #[error("invalid path segment '{0}'")]
    InvalidPathSegment(String),

    /// The body could not be flattened into a form.
    #[error("form encoding failed: {0}")]
    FormEncoding(#[from] serde_urlencoded::ser::Error),

    /// The body could not be serialized to JSON.
    #[error("JSON encoding failed: {0}")]
    JsonEncoding(#[source] serde_json::Error),

    /// A header hint is not a valid header value.
    #[error("invalid value for header {name}: {source}")]
    InvalidHeader {
        name: &'static str,
        #[source]
        source: reqwest::header::InvalidHeaderValue,
    },

    /// reqwest refused to assemble the request.
    #[error("failed to build request: {0}")]
    RequestBuild(#[source] reqwest::Error),

    /// Network-level failure while dispatching or reading the response.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The request context was cancelled.
    #[error("request cancelled")]
    Cancelled,

    /// The request context deadline passed.
    #[error("request deadline exceeded")]
    DeadlineExceeded,

    /// Keycloak answered with a status of 300 or above.
    #[error(transparent)]
    Upstream(Box<ErrorResponse>),

    /// A successful response body did not match the expected shape.
    /// The response itself is still available.
    #[error("failed to decode response body: {source}")]
    Decode {
        response: Box<Response>,
        #[source]
        source: serde_json::Error,
    },

    /// Writing the response body into the caller's sink failed.
    #[error("failed to write response body: {0}")]
    Sink(#[from] std::io::Error),

    /// An access token could not be inspected.
    #[error("invalid token: {0}")]
    InvalidToken(String),
}

impl KeycloakError {
    /// Returns the upstream error response, if Keycloak rejected the request.
    pub fn as_upstream(&self) -> Option<&ErrorResponse> {
        match self {
            KeycloakError::Upstream(error) => Some(error),
            _ => None,
        }
    }

    /// Returns the response wrapper carried by this error, if any.
    pub fn response(&self) -> Option<&Response> {
        match self {
            KeycloakError::Upstream(error) => Some(&error.response),
            KeycloakError::Decode { response, .. } => Some(response),
            _ => None,
        }
    }
}

/// The error response returned by Keycloak for any status of 300 or above.
///
/// `message` holds the `error_description` of the body when it could be
/// parsed, and is empty otherwise. The raw body is kept for inspection.
#[derive(Debug, Clone)]
pub struct ErrorResponse {
    pub method: Method,
    pub response: Response,
    pub body: Bytes,
    pub message: String,
}

impl fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}: {} {}",
            self.method,
            self.response.url(),
            self.response.status().as_u16(),
            self.message
        )
    }
}

impl std::error::Error for ErrorResponse {}
