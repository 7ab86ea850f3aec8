//! Error types for toolgate
//!
//! Centralized error handling using thiserror. `ErrorKind` is the taxonomy
//! shown to end users; `GatewayError` is what library code returns.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// User-facing error taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Network or connection failure talking to a tool provider
    ProviderUnavailable,
    /// Provider was reached but reported a logical failure
    ProviderError,
    /// No provider offers the requested tool
    UnknownTool,
    /// More than one provider claims the requested tool
    AmbiguousTool,
    /// Model output could not be interpreted
    ModelResponseInvalid,
    /// Model endpoint unreachable or returned an error status
    ModelUnavailable,
    /// Deployment defect such as a tool-name collision
    ConfigurationError,
    /// Caller went away before the turn finished
    Cancelled,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ProviderUnavailable => "ProviderUnavailable",
            Self::ProviderError => "ProviderError",
            Self::UnknownTool => "UnknownTool",
            Self::AmbiguousTool => "AmbiguousTool",
            Self::ModelResponseInvalid => "ModelResponseInvalid",
            Self::ModelUnavailable => "ModelUnavailable",
            Self::ConfigurationError => "ConfigurationError",
            Self::Cancelled => "Cancelled",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// All error types that can occur in toolgate
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Invalid model response: {0}")]
    ModelResponseInvalid(String),

    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Request cancelled: {0}")]
    Cancelled(String),

    /// RPC transport error (framing, connection handling)
    #[error("IPC error: {0}")]
    Ipc(String),

    /// SQLite error inside a provider
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl GatewayError {
    /// Map onto the user-facing taxonomy
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Ipc(_) | Self::Io(_) => ErrorKind::ProviderUnavailable,
            Self::Database(_) | Self::Json(_) => ErrorKind::ProviderError,
            Self::ModelResponseInvalid(_) => ErrorKind::ModelResponseInvalid,
            Self::ModelUnavailable(_) => ErrorKind::ModelUnavailable,
            Self::Configuration(_) => ErrorKind::ConfigurationError,
            Self::Cancelled(_) => ErrorKind::Cancelled,
        }
    }
}

/// Result type alias for toolgate operations
pub type Result<T> = std::result::Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_errors_map_to_model_kinds() {
        assert_eq!(
            GatewayError::ModelUnavailable("refused".into()).kind(),
            ErrorKind::ModelUnavailable
        );
        assert_eq!(
            GatewayError::ModelResponseInvalid("no message".into()).kind(),
            ErrorKind::ModelResponseInvalid
        );
    }

    #[test]
    fn test_configuration_error() {
        let err = GatewayError::Configuration("duplicate provider id 'sql'".to_string());
        assert_eq!(err.to_string(), "Configuration error: duplicate provider id 'sql'");
        assert_eq!(err.kind(), ErrorKind::ConfigurationError);
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err: GatewayError = io_err.into();
        assert!(matches!(err, GatewayError::Io(_)));
        assert_eq!(err.kind(), ErrorKind::ProviderUnavailable);
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid").unwrap_err();
        let err: GatewayError = json_err.into();
        assert!(matches!(err, GatewayError::Json(_)));
        assert_eq!(err.kind(), ErrorKind::ProviderError);
    }

    #[test]
    fn test_error_kind_serializes_as_name() {
        let json = serde_json::to_string(&ErrorKind::ProviderUnavailable).unwrap();
        assert_eq!(json, "\"ProviderUnavailable\"");
        assert_eq!(ErrorKind::AmbiguousTool.to_string(), "AmbiguousTool");
    }
}
