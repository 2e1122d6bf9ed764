//! Reconstruction error types

use contracts::ContractError;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ReconstructError {
    /// Nothing to reconstruct
    #[error("reconstruction input is empty")]
    InputEmpty,

    /// Last tick is past the configured bound or cannot be allocated
    #[error("tick {tick} out of range (limit {limit})")]
    TickOutOfRange { tick: u64, limit: u64 },
}

impl From<ReconstructError> for ContractError {
    fn from(err: ReconstructError) -> Self {
        match err {
            ReconstructError::InputEmpty => ContractError::ReconstructionInputEmpty,
            other => ContractError::Other(other.to_string()),
        }
    }
}
