//! Error types for Zeppelin
//!
//! The topology engine and the broker never fail outward; errors only come
//! from the edges: configuration, the external `gt`/`bd` tooling, and the HTTP
//! listener.

use thiserror::Error;

/// Main error type for Zeppelin operations
#[derive(Error, Debug)]
pub enum ZeppelinError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// External command failed, exited non-zero, or timed out
    #[error("Command '{program}' failed: {message}")]
    Command { program: String, message: String },

    /// Bind address could not be parsed
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

/// Result type alias for Zeppelin operations
pub type Result<T> = std::result::Result<T, ZeppelinError>;

impl ZeppelinError {
    pub fn command(program: impl Into<String>, message: impl Into<String>) -> Self {
        ZeppelinError::Command {
            program: program.into(),
            message: message.into(),
        }
    }
}

/// Convert anyhow::Error to ZeppelinError
impl From<anyhow::Error> for ZeppelinError {
    fn from(err: anyhow::Error) -> Self {
        ZeppelinError::Other(err.to_string())
    }
}
