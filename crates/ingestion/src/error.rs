//! Ingestion error types

use contracts::ContractError;
use thiserror::Error;

/// Ingestion error
#[derive(Debug, Error)]
pub enum IngestionError {
    /// Bus has been shut down
    #[error("message bus is shut down, cannot subscribe to '{topic}'")]
    BusClosed { topic: String },
}

impl From<IngestionError> for ContractError {
    fn from(err: IngestionError) -> Self {
        match err {
            IngestionError::BusClosed { topic } => ContractError::SubscriptionClosed { topic },
        }
    }
}

/// Ingestion Result type alias
pub type Result<T> = std::result::Result<T, IngestionError>;
