//! Error types for tokenrelay.

use std::time::Duration;
use thiserror::Error;

/// Classification of a failure, as reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed or missing caller input.
    BadRequest,
    /// The remote service failed (non-2xx or unreachable) after retries.
    UpstreamFailure,
    /// A per-attempt deadline was exceeded on the final attempt.
    Timeout,
    /// Required endpoint or credentials are not configured.
    Configuration,
    /// Anything else.
    Unknown,
}

#[derive(Error, Debug)]
pub enum RelayError {
    // Caller input
    #[error("{message}")]
    BadRequest { message: String },

    // Configuration errors
    #[error("{message}")]
    Configuration { message: String },

    #[error("Configuration error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    // Upstream errors
    #[error("HTTP error! status: {status} {body}")]
    Upstream { status: u16, body: String },

    #[error("Upstream request timed out after {}s", .timeout.as_secs())]
    Timeout { timeout: Duration },

    #[error("Upstream request failed: {message}")]
    Transport { message: String },

    // Streaming errors (after the response has started)
    #[error("Stream error: {message}")]
    Stream { message: String },

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Generic error for cases not covered above
    #[error("{0}")]
    Other(String),
}

impl RelayError {
    /// Shorthand for a caller-input error.
    pub fn bad_request(message: impl Into<String>) -> Self {
        RelayError::BadRequest {
            message: message.into(),
        }
    }

    /// Shorthand for a missing-configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        RelayError::Configuration {
            message: message.into(),
        }
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            RelayError::BadRequest { .. } => ErrorKind::BadRequest,
            RelayError::Configuration { .. } | RelayError::ConfigParse(_) => {
                ErrorKind::Configuration
            }
            RelayError::Upstream { .. } | RelayError::Transport { .. } => {
                ErrorKind::UpstreamFailure
            }
            RelayError::Timeout { .. } => ErrorKind::Timeout,
            RelayError::Stream { .. } | RelayError::Io(_) | RelayError::Other(_) => {
                ErrorKind::Unknown
            }
        }
    }

    /// HTTP status code to report for this error.
    ///
    /// Upstream failures mirror the last observed upstream status; failures
    /// that never produced an HTTP response map to 500.
    pub fn status_code(&self) -> u16 {
        match self {
            RelayError::BadRequest { .. } => 400,
            RelayError::Upstream { status, .. } if (400..600).contains(status) => *status,
            _ => 500,
        }
    }
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, RelayError>;
