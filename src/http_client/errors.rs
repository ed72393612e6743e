//! HTTP client - error types.

use reqwest::StatusCode;
use thiserror::Error;

use crate::http_client::envelope::Envelope;

/// Marker used as the cancellation reason of superseded requests.
pub const CANCEL_MARKER: &str = "cancel";

/// Error type used when constructing an HTTP client.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum HttpClientError {
    /// HTTP client error.
    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),
    /// Base URL is not a valid absolute URL.
    #[error("Invalid base URL: {0}")]
    InvalidBaseUrl(url::ParseError),
}

/// Error type of a single request.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RequestError {
    /// Server returned an envelope with a non-success status.
    #[error("Request rejected with status {}", .0.status)]
    Application(Envelope),
    /// Request was superseded by a newer request with the same URL and method.
    #[error("cancel")]
    Cancelled,
    /// Network-level or middleware error.
    #[error(transparent)]
    Transport(#[from] reqwest_middleware::Error),
    /// Server responded with a non-successful HTTP status.
    #[error("Request failed with status code {}", .0.as_u16())]
    Status(StatusCode),
    /// Response body is not a valid envelope.
    #[error("Invalid response body: {0}")]
    Decode(reqwest::Error),
    /// Request URL cannot be resolved against the base URL.
    #[error("Invalid request URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// Request parameters cannot be serialized.
    #[error("Unable to serialize request parameters: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl RequestError {
    /// Whether this is a benign cancellation of a superseded request.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Returns the envelope of an application-level failure.
    #[must_use]
    pub fn envelope(&self) -> Option<&Envelope> {
        match self {
            Self::Application(env) => Some(env),
            _ => None,
        }
    }
}
