//! Error types for StatusRelay
//!
//! Request-level and infrastructure failures. Per-platform publish failures
//! are absorbed by the orchestrator and recorded as status data instead.

use thiserror::Error;

/// Result type alias for StatusRelay operations
pub type Result<T> = std::result::Result<T, RelayError>;

/// Error type for StatusRelay operations
#[derive(Error, Debug)]
pub enum RelayError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed or incomplete request input
    #[error("Validation error: {0}")]
    Validation(String),

    /// Update record not found
    #[error("Update not found: {0}")]
    NotFound(String),

    /// Storage errors that are not raw SQLite failures
    #[error("Storage error: {0}")]
    Storage(String),

    /// Parsing errors (dates, timestamps, months)
    #[error("Parse error: {0}")]
    Parse(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// SQLite database errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Integration errors (Slack, Teams, Jira)
    #[error("Integration error: {0}")]
    Integration(String),

    /// Other errors
    #[error("{0}")]
    Other(String),
}

impl RelayError {
    /// Whether the error was caused by the caller rather than the server
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            RelayError::Validation(_) | RelayError::Parse(_) | RelayError::NotFound(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_error_classification() {
        assert!(RelayError::Validation("updateId is required".into()).is_client_error());
        assert!(RelayError::NotFound("abc".into()).is_client_error());
        assert!(!RelayError::Storage("disk full".into()).is_client_error());
        assert!(!RelayError::Integration("boom".into()).is_client_error());
    }

    #[test]
    fn test_display_messages() {
        let err = RelayError::NotFound("42".into());
        assert_eq!(err.to_string(), "Update not found: 42");
    }
}
