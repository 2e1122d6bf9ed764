//! Session - one bounded telemetry-collection interval of one device

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::DeviceId;

/// Session lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Device connected, telemetry being buffered
    #[default]
    Open,
    /// Reconstruction finished, end time assigned
    Closed,
    /// Processing aborted; kept for inspection
    Failed,
}

/// Persisted session record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub device_id: DeviceId,
    pub name: String,

    /// Epoch milliseconds at connect
    pub start_time: i64,

    /// `start_time + max tick`, set once on close
    pub end_time: Option<i64>,

    #[serde(default)]
    pub status: SessionStatus,

    /// CSV written for this session, set on close when the export succeeded
    #[serde(default)]
    pub export_path: Option<PathBuf>,
}

impl Session {
    /// End time for a session whose largest observed tick is `max_tick`
    pub fn end_time_for(&self, max_tick: u64) -> i64 {
        self.start_time
            .saturating_add(i64::try_from(max_tick).unwrap_or(i64::MAX))
    }

    pub fn is_open(&self) -> bool {
        self.status == SessionStatus::Open
    }
}

/// Session creation request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSession {
    pub device_id: DeviceId,
    pub name: String,
    pub start_time: i64,
}

impl NewSession {
    /// Session named with a freshly generated UUID
    pub fn generated(device_id: DeviceId, start_time: i64) -> Self {
        Self {
            device_id,
            name: Uuid::new_v4().to_string(),
            start_time,
        }
    }
}
