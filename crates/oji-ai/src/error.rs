//! Error types for oji-ai

use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

/// Result type alias using oji-ai Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when talking to an OpenAI-compatible endpoint
#[derive(Error, Debug)]
pub enum Error {
    /// The server answered with a non-2xx status
    #[error("HTTP {status}: {}", extract_error_detail(.body))]
    Status { status: u16, body: String },

    /// Connection-level failure (unreachable host, refused, reset, TLS)
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The deadline elapsed before the server answered
    #[error("Request timed out after {} seconds", .0.as_secs())]
    Timeout(Duration),

    /// The caller cancelled the request
    #[error("Request cancelled")]
    Cancelled,

    /// Unexpected response format
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Coarse error categories used for presentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// 401
    Authentication,
    /// 403
    AccessDenied,
    /// 429
    RateLimited,
    /// 5xx
    Server,
    /// 400
    BadRequest,
    /// 404
    NotFound,
    /// Any other non-2xx status
    GenericHttp,
    Network,
    Timeout,
    Cancelled,
    InvalidResponse,
    InvalidConfig,
}

impl ErrorKind {
    /// Map an HTTP status code to its category.
    pub fn from_status(status: u16) -> Self {
        match status {
            400 => ErrorKind::BadRequest,
            401 => ErrorKind::Authentication,
            403 => ErrorKind::AccessDenied,
            404 => ErrorKind::NotFound,
            429 => ErrorKind::RateLimited,
            500..=599 => ErrorKind::Server,
            _ => ErrorKind::GenericHttp,
        }
    }

    /// Short human-readable title
    pub fn title(&self) -> &'static str {
        match self {
            ErrorKind::Authentication => "Authentication failed",
            ErrorKind::AccessDenied => "Access denied",
            ErrorKind::RateLimited => "Rate limited",
            ErrorKind::Server => "Server error",
            ErrorKind::BadRequest => "Bad request",
            ErrorKind::NotFound => "Endpoint not found",
            ErrorKind::GenericHttp => "HTTP error",
            ErrorKind::Network => "Network error",
            ErrorKind::Timeout => "Connection timed out",
            ErrorKind::Cancelled => "Cancelled",
            ErrorKind::InvalidResponse => "Invalid response",
            ErrorKind::InvalidConfig => "Invalid configuration",
        }
    }
}

/// An error reduced to what a user should see: a title and a detailed body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedError {
    pub kind: ErrorKind,
    pub status: Option<u16>,
    pub title: String,
    pub detail: String,
}

impl Error {
    /// Create a status error from a code and raw body text
    pub fn status(status: u16, body: impl Into<String>) -> Self {
        Self::Status {
            status,
            body: body.into(),
        }
    }

    /// The category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Status { status, .. } => ErrorKind::from_status(*status),
            Error::Network(e) if e.is_timeout() => ErrorKind::Timeout,
            Error::Network(_) => ErrorKind::Network,
            Error::Json(_) | Error::UnexpectedResponse(_) => ErrorKind::InvalidResponse,
            Error::Timeout(_) => ErrorKind::Timeout,
            Error::Cancelled => ErrorKind::Cancelled,
            Error::InvalidConfig(_) => ErrorKind::InvalidConfig,
        }
    }

    /// Cancellation is a deliberate user action and is never presented.
    pub fn is_silent(&self) -> bool {
        matches!(self, Error::Cancelled)
    }

    /// Reduce this error to a title and a detail body for display
    pub fn classify(&self) -> ClassifiedError {
        let kind = self.kind();
        let (status, detail) = match self {
            Error::Status { status, body } => {
                let reason = reqwest::StatusCode::from_u16(*status)
                    .ok()
                    .and_then(|s| s.canonical_reason())
                    .unwrap_or("Unknown Status");
                let detail = extract_error_detail(body);
                let detail = if detail.is_empty() {
                    format!("{} {}", status, reason)
                } else {
                    format!("{} {}: {}", status, reason, detail)
                };
                (Some(*status), detail)
            }
            Error::Network(e) => (e.status().map(|s| s.as_u16()), e.to_string()),
            Error::Cancelled => (None, String::new()),
            other => (None, other.to_string()),
        };

        ClassifiedError {
            kind,
            status,
            title: kind.title().to_string(),
            detail,
        }
    }
}

/// Pull a human-readable message out of an error response body.
///
/// Servers disagree on the error shape, so the common fields are tried in
/// order and the raw body is the fallback.
pub fn extract_error_detail(body: &str) -> String {
    let trimmed = body.trim();
    let Ok(value) = serde_json::from_str::<Value>(trimmed) else {
        return trimmed.to_string();
    };

    let probes: [&[&str]; 6] = [
        &["error", "message"],
        &["error"],
        &["message"],
        &["detail"],
        &["error_description"],
        &["msg"],
    ];

    for path in probes {
        let mut node = &value;
        let mut found = true;
        for key in path {
            match node.get(key) {
                Some(next) => node = next,
                None => {
                    found = false;
                    break;
                }
            }
        }
        if !found {
            continue;
        }
        match node {
            Value::String(s) if !s.trim().is_empty() => return s.trim().to_string(),
            Value::Array(items) if !items.is_empty() => {
                // FastAPI-style validation lists: [{"msg": "..."}]
                let joined = items
                    .iter()
                    .filter_map(|item| {
                        item.get("msg")
                            .and_then(Value::as_str)
                            .or_else(|| item.as_str())
                    })
                    .collect::<Vec<_>>()
                    .join("; ");
                if !joined.is_empty() {
                    return joined;
                }
            }
            _ => {}
        }
    }

    trimmed.to_string()
}
