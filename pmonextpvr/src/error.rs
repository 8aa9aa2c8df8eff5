//! Error handling for the NextPVR client

use thiserror::Error;

/// Custom Result type for pmonextpvr
pub type Result<T> = std::result::Result<T, NextPvrError>;

/// Errors returned by the NextPVR client
#[derive(Error, Debug)]
pub enum NextPvrError {
    /// A required setting is missing (web service URL, PIN)
    #[error("NextPVR is not configured: missing {setting}")]
    Configuration { setting: &'static str },

    /// The PIN was rejected or the handshake answer is unusable
    #[error("NextPVR authentication failed: {0}")]
    Unauthorized(String),

    /// Network failure, timeout, connection refused...
    #[error("NextPVR transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Non-2xx HTTP status
    #[error("NextPVR HTTP error (code {code}): {message}")]
    HttpStatus { code: u16, message: String },

    /// The backend answered with its own failure flag
    #[error("NextPVR {operation} failed for {id}: {reason}")]
    BackendOperation {
        operation: &'static str,
        id: String,
        reason: String,
    },

    /// No resolvable stream for the requested item
    #[error("Not found: {0}")]
    NotFound(String),

    /// Input rejected before reaching the backend
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("JSON parsing error: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// The operation was cancelled by its caller
    #[error("Operation cancelled")]
    Cancelled,

    /// Configuration layer error (anyhow)
    #[error("Configuration error: {0}")]
    Config(#[from] anyhow::Error),
}

impl NextPvrError {
    /// Builds a backend operation failure
    pub fn backend(operation: &'static str, id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::BackendOperation {
            operation,
            id: id.into(),
            reason: reason.into(),
        }
    }

    /// Whether retrying later may succeed (network hiccup, server restart)
    pub fn is_transient(&self) -> bool {
        match self {
            NextPvrError::Transport(_) => true,
            NextPvrError::HttpStatus { code, .. } => *code >= 500 || *code == 408 || *code == 429,
            _ => false,
        }
    }

    /// Whether the error needs user action on the configured credentials
    pub fn is_auth_error(&self) -> bool {
        matches!(
            self,
            NextPvrError::Unauthorized(_) | NextPvrError::Configuration { .. }
        )
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, NextPvrError::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_error_names_setting() {
        let err = NextPvrError::Configuration { setting: "pin" };
        assert!(err.to_string().contains("pin"));
        assert!(err.is_auth_error());
        assert!(!err.is_transient());
    }

    #[test]
    fn test_backend_error_names_id() {
        let err = NextPvrError::backend("recording.delete", "4242", "Recording not found");
        let message = err.to_string();
        assert!(message.contains("4242"));
        assert!(message.contains("recording.delete"));
        assert!(!err.is_transient());
        assert!(!err.is_auth_error());
    }

    #[test]
    fn test_http_status_classification() {
        let server_error = NextPvrError::HttpStatus {
            code: 503,
            message: String::new(),
        };
        let client_error = NextPvrError::HttpStatus {
            code: 404,
            message: String::new(),
        };
        assert!(server_error.is_transient());
        assert!(!client_error.is_transient());
        assert!(NextPvrError::Cancelled.is_cancelled());
    }
}
