//! Session error types

use contracts::ContractError;
use ingestion::IngestionError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Contract(#[from] ContractError),

    #[error(transparent)]
    Ingestion(#[from] IngestionError),
}

impl From<SessionError> for ContractError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Contract(inner) => inner,
            SessionError::Ingestion(inner) => inner.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;
