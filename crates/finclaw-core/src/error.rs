//! FinClaw error types.

use thiserror::Error;

/// Result alias used across FinClaw crates.
pub type Result<T> = std::result::Result<T, FinClawError>;

/// Errors raised by the scheduler engine and its collaborators.
#[derive(Debug, Error)]
pub enum FinClawError {
    /// Bad configuration or schedule definition.
    #[error("Config error: {0}")]
    Config(String),

    /// Ledger storage unavailable or a statement failed.
    #[error("Database error: {0}")]
    Database(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// A state transition was requested from a state that does not allow it.
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl From<rusqlite::Error> for FinClawError {
    fn from(e: rusqlite::Error) -> Self {
        FinClawError::Database(e.to_string())
    }
}

impl From<toml::de::Error> for FinClawError {
    fn from(e: toml::de::Error) -> Self {
        FinClawError::Config(format!("Failed to parse config: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let e = FinClawError::Config("bad time".into());
        assert_eq!(e.to_string(), "Config error: bad time");

        let e = FinClawError::NotFound("intent abc".into());
        assert_eq!(e.to_string(), "Not found: intent abc");
    }

    #[test]
    fn test_from_rusqlite() {
        let e: FinClawError = rusqlite::Error::InvalidQuery.into();
        assert!(matches!(e, FinClawError::Database(_)));
    }
}
