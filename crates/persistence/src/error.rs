//! Persistence error types

use std::path::PathBuf;

use contracts::ContractError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistenceError {
    /// CSV file could not be created or written
    #[error("failed to write '{}': {source}", path.display())]
    Export {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Exported CSV text does not have the expected shape
    #[error("csv line {line}: {message}")]
    CsvParse { line: usize, message: String },
}

impl PersistenceError {
    pub fn csv_parse(line: usize, message: impl Into<String>) -> Self {
        Self::CsvParse {
            line,
            message: message.into(),
        }
    }
}

impl From<PersistenceError> for ContractError {
    fn from(err: PersistenceError) -> Self {
        match err {
            PersistenceError::Export { path, source } => {
                ContractError::export_write(path.display().to_string(), source.to_string())
            }
            other => ContractError::Other(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, PersistenceError>;
