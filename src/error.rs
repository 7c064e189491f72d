//! Error types for chatbridge

use thiserror::Error;

/// Errors surfaced by a completion request.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Connection, DNS or timeout failure before (or while) a response was read.
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The provider answered with HTTP status >= 400.
    #[error("API error: HTTP {status} (Endpoint: {endpoint}) {message}")]
    ProviderHttp {
        status: u16,
        endpoint: String,
        message: String,
    },

    /// A successful exchange that yielded no text.
    #[error("Empty response from model")]
    EmptyResponse,

    /// Invalid or missing settings, raised before any network call.
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RelayError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// True for network-level failures, including timeouts.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::ProviderHttp { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Result type alias for chatbridge operations
pub type Result<T> = std::result::Result<T, RelayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_http_display() {
        let err = RelayError::ProviderHttp {
            status: 401,
            endpoint: "/v1/messages".to_string(),
            message: "bad key".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "API error: HTTP 401 (Endpoint: /v1/messages) bad key"
        );
        assert_eq!(err.status(), Some(401));
        assert!(!err.is_transport());
    }

    #[test]
    fn test_config_error_display() {
        let err = RelayError::config("Missing API URL or model");
        assert_eq!(err.to_string(), "Configuration error: Missing API URL or model");
        assert_eq!(err.status(), None);
    }
}
