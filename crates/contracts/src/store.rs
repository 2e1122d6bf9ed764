//! External collaborators: session store, sensor registry, datum store
//!
//! Implementations are injected into every session controller behind an
//! `Arc`, so they take `&self` and must be `Send + Sync`.

use std::path::PathBuf;

use uuid::Uuid;

use crate::{ContractError, Datum, DeviceId, NewSession, SensorInfo, Session};

/// Session persistence
#[trait_variant::make(SessionStore: Send)]
pub trait LocalSessionStore {
    /// Persist a new open session
    async fn create_session(&self, new: NewSession) -> Result<Session, ContractError>;

    /// Re-read a session (it may have been edited since creation)
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Session>, ContractError>;

    /// Assign the end time and export path, mark the session closed
    ///
    /// # Errors
    /// Fails if the session does not exist or is no longer open
    async fn close_session(
        &self,
        id: Uuid,
        end_time: i64,
        export_path: Option<PathBuf>,
    ) -> Result<Session, ContractError>;

    /// Mark a session whose pipeline was aborted
    async fn mark_failed(&self, id: Uuid) -> Result<(), ContractError>;
}

/// Sensor lookup
#[trait_variant::make(SensorRegistry: Send)]
pub trait LocalSensorRegistry {
    /// All sensors registered to a device
    async fn find_all_by_device(&self, device_id: DeviceId)
        -> Result<Vec<SensorInfo>, ContractError>;
}

/// Datum persistence
#[trait_variant::make(DatumStore: Send)]
pub trait LocalDatumStore {
    /// Bulk insert, returns the number of rows written
    async fn insert_many(&self, datums: Vec<Datum>) -> Result<usize, ContractError>;
}
