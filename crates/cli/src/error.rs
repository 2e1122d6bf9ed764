//! Error types for CLI operations.

use std::path::Path;

use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// Replay or capture input could not be read
    #[error("Failed to read input {path}: {message}")]
    InputRead { path: String, message: String },

    /// Listener could not be started
    #[error("Failed to start listener: {message}")]
    ListenerStart { message: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CliError {
    pub fn config_not_found(path: &Path) -> Self {
        Self::ConfigNotFound {
            path: path.display().to_string(),
        }
    }

    pub fn input_read(path: &Path, message: impl Into<String>) -> Self {
        Self::InputRead {
            path: path.display().to_string(),
            message: message.into(),
        }
    }

    pub fn listener_start(message: impl Into<String>) -> Self {
        Self::ListenerStart {
            message: message.into(),
        }
    }
}

/// Fail with `ConfigNotFound` unless the file exists
pub fn ensure_config_exists(path: &Path) -> Result<(), CliError> {
    if path.exists() {
        Ok(())
    } else {
        Err(CliError::config_not_found(path))
    }
}
