//! Provider error types.

use thiserror::Error;

/// Errors returned by the remote provider API.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// The provider answered with a non-success status.
    #[error("provider returned {status} {code}: {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    /// The request never produced a response.
    #[error("transport: {0}")]
    Transport(String),

    /// The response body could not be decoded.
    #[error("decode: {0}")]
    Decode(String),
}

impl ProviderError {
    pub fn api(status: u16, code: impl Into<String>, message: impl Into<String>) -> Self {
        ProviderError::Api {
            status,
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::api(404, "RESOURCE_NOT_FOUND", what)
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ProviderError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    pub fn is_bad_request(&self) -> bool {
        self.status() == Some(400)
    }

    /// Network failures, server errors and rate limiting.
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::Transport(_) => true,
            ProviderError::Api { status, .. } => *status == 429 || *status >= 500,
            ProviderError::Decode(_) => false,
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ProviderError::Decode(e.to_string())
        } else if let Some(status) = e.status() {
            ProviderError::api(status.as_u16(), "", e.to_string())
        } else {
            ProviderError::Transport(e.to_string())
        }
    }
}

/// Result type for provider calls.
pub type Result<T> = std::result::Result<T, ProviderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(ProviderError::not_found("cluster").is_not_found());
        assert!(ProviderError::api(400, "INVALID", "x").is_bad_request());
        assert!(ProviderError::api(503, "", "x").is_transient());
        assert!(ProviderError::api(429, "RATE_LIMITED", "x").is_transient());
        assert!(ProviderError::Transport("reset".to_string()).is_transient());
        assert!(!ProviderError::api(409, "", "x").is_transient());
        assert!(!ProviderError::Decode("eof".to_string()).is_transient());
    }
}
