//! MemoryStore - 内存版会话存储、传感器注册表与数据点存储
//!
//! 供 CLI 和测试使用，支持按操作注入失败场景。

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use contracts::{
    ContractError, Datum, DatumStore, DeviceId, NewSession, SensorInfo, SensorRegistry,
    ServiceConfig, Session, SessionStatus, SessionStore,
};
use tracing::{debug, instrument};
use uuid::Uuid;

/// Operations that should fail
#[derive(Debug, Default, Clone)]
pub struct MemoryFaults {
    pub fail_create: bool,
    pub fail_close: bool,
    pub fail_registry: bool,
    pub fail_inserts: bool,
}

/// In-memory implementation of every collaborator trait
#[derive(Default)]
pub struct MemoryStore {
    faults: MemoryFaults,
    sessions: Mutex<HashMap<Uuid, Session>>,
    sensors: Mutex<HashMap<DeviceId, Vec<SensorInfo>>>,
    datums: Mutex<Vec<Datum>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_faults(faults: MemoryFaults) -> Self {
        Self {
            faults,
            ..Self::default()
        }
    }

    /// Store whose registry is seeded from the configured devices
    pub fn from_config(config: &ServiceConfig) -> Self {
        let store = Self::new();
        for device in &config.devices {
            for sensor in &device.sensors {
                store.register_sensor(device.id, SensorInfo::from(sensor));
            }
        }
        store
    }

    /// Register (or replace, by compact key) a sensor of a device
    pub fn register_sensor(&self, device_id: DeviceId, sensor: SensorInfo) {
        let mut sensors = lock(&self.sensors);
        let device_sensors = sensors.entry(device_id).or_default();
        device_sensors.retain(|s| s.compact_key != sensor.compact_key);
        device_sensors.push(sensor);
    }

    /// All sessions, oldest first
    pub fn sessions(&self) -> Vec<Session> {
        let mut sessions: Vec<Session> = lock(&self.sessions).values().cloned().collect();
        sessions.sort_by(|a, b| a.start_time.cmp(&b.start_time).then(a.id.cmp(&b.id)));
        sessions
    }

    pub fn session(&self, id: Uuid) -> Option<Session> {
        lock(&self.sessions).get(&id).cloned()
    }

    /// Rename a session, as an operator editing it mid-flight would
    pub fn rename_session(&self, id: Uuid, name: impl Into<String>) -> bool {
        match lock(&self.sessions).get_mut(&id) {
            Some(session) => {
                session.name = name.into();
                true
            }
            None => false,
        }
    }

    /// Datums of one session, in insertion order
    pub fn datums_for(&self, session_id: Uuid) -> Vec<Datum> {
        lock(&self.datums)
            .iter()
            .filter(|d| d.session_id == session_id)
            .copied()
            .collect()
    }

    pub fn datum_count(&self) -> usize {
        lock(&self.datums).len()
    }

    fn injected(operation: &str) -> ContractError {
        ContractError::persistence(operation, "injected failure")
    }
}

impl SessionStore for MemoryStore {
    #[instrument(name = "memory_create_session", skip(self, new), fields(device_id = %new.device_id))]
    async fn create_session(&self, new: NewSession) -> Result<Session, ContractError> {
        if self.faults.fail_create {
            return Err(Self::injected("create_session"));
        }

        let mut sessions = lock(&self.sessions);
        if sessions
            .values()
            .any(|s| s.device_id == new.device_id && s.name == new.name)
        {
            return Err(ContractError::persistence(
                "create_session",
                format!("session '{}' already exists for device {}", new.name, new.device_id),
            ));
        }

        let session = Session {
            id: Uuid::new_v4(),
            device_id: new.device_id,
            name: new.name,
            start_time: new.start_time,
            end_time: None,
            status: SessionStatus::Open,
            export_path: None,
        };
        sessions.insert(session.id, session.clone());

        debug!(session_id = %session.id, "Session created");
        Ok(session)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Session>, ContractError> {
        Ok(self.session(id))
    }

    #[instrument(name = "memory_close_session", skip(self))]
    async fn close_session(
        &self,
        id: Uuid,
        end_time: i64,
        export_path: Option<PathBuf>,
    ) -> Result<Session, ContractError> {
        if self.faults.fail_close {
            return Err(Self::injected("close_session"));
        }

        let mut sessions = lock(&self.sessions);
        let session = sessions
            .get_mut(&id)
            .ok_or_else(|| ContractError::persistence("close_session", format!("session {id} not found")))?;

        if !session.is_open() {
            return Err(ContractError::persistence(
                "close_session",
                format!("session {id} is {:?}, not open", session.status),
            ));
        }

        session.end_time = Some(end_time);
        session.export_path = export_path;
        session.status = SessionStatus::Closed;
        Ok(session.clone())
    }

    async fn mark_failed(&self, id: Uuid) -> Result<(), ContractError> {
        let mut sessions = lock(&self.sessions);
        let session = sessions
            .get_mut(&id)
            .ok_or_else(|| ContractError::persistence("mark_failed", format!("session {id} not found")))?;
        session.status = SessionStatus::Failed;
        Ok(())
    }
}

impl SensorRegistry for MemoryStore {
    async fn find_all_by_device(&self, device_id: DeviceId) -> Result<Vec<SensorInfo>, ContractError> {
        if self.faults.fail_registry {
            return Err(Self::injected("find_all_by_device"));
        }
        Ok(lock(&self.sensors).get(&device_id).cloned().unwrap_or_default())
    }
}

impl DatumStore for MemoryStore {
    async fn insert_many(&self, datums: Vec<Datum>) -> Result<usize, ContractError> {
        if self.faults.fail_inserts {
            return Err(Self::injected("insert_many"));
        }
        let count = datums.len();
        lock(&self.datums).extend(datums);
        Ok(count)
    }
}
