//! Sensor registry snapshot and persisted datum

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ChannelKey;

/// Registered sensor, as seen by one session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorInfo {
    /// Canonical sensor identity
    pub sensor_id: Uuid,

    /// Human-readable name, used as the CSV column header
    pub name: String,

    /// Key the device uses for this sensor on the wire
    pub compact_key: ChannelKey,
}

/// One persisted value of one sensor at one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Datum {
    pub session_id: Uuid,
    pub sensor_id: Uuid,
    /// Device tick
    pub timestamp: u64,
    pub value: i64,
}
