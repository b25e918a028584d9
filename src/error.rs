//! Error types shared by the API client, the event stream and the stores.

use thiserror::Error;

/// Errors surfaced by calls to the conversation service.
///
/// Every variant displays as a single human-readable message; callers that
/// need the server-provided reason use [`ApiError::detail`].
#[derive(Debug, Error)]
pub enum ApiError {
    /// No response was received (connection refused, DNS, timeout, body read failure).
    #[error("{message}")]
    Transport {
        message: String,
        #[source]
        source: reqwest::Error,
    },

    /// The request could not be built.
    #[error("{message}")]
    Request {
        message: String,
        #[source]
        source: reqwest::Error,
    },

    /// The server answered with a non-success status.
    #[error("{}", server_message(.detail, .message))]
    Server {
        status: u16,
        detail: Option<String>,
        message: String,
    },

    /// The event stream endpoint refused the request.
    #[error("HTTP error! status: {status}, message: {body}")]
    Status { status: u16, body: String },

    /// A success response whose body did not match the expected shape.
    #[error("{message}")]
    Decode {
        message: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("API health check failed")]
    HealthCheck,
}

fn server_message<'a>(detail: &'a Option<String>, fallback: &'a str) -> &'a str {
    detail.as_deref().unwrap_or(fallback)
}

impl ApiError {
    /// HTTP status of the response, when one was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Server { status, .. } | ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// The `detail` field of the server's error body, if it sent one.
    pub fn detail(&self) -> Option<&str> {
        match self {
            ApiError::Server { detail, .. } => detail.as_deref(),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(401)
    }
}

/// Extracts a string `detail` field from a JSON error body.
pub(crate) fn extract_detail(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value.get("detail")?.as_str().map(str::to_string)
}
