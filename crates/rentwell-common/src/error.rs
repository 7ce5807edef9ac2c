use thiserror::Error;

/// Errors raised while loading or serialising configuration
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },

    #[error("Failed to parse configuration: {details}")]
    ParseError { details: String },

    #[error("Invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },
}
