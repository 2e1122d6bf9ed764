//! ServiceConfig - Config Loader output
//!
//! Broker topics, export location, session supervision and the device/sensor
//! registry seed.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;
use validator::Validate;

use crate::{ChannelKey, DeviceId, SensorInfo};

/// Config version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// Complete service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct ServiceConfig {
    #[serde(default)]
    pub version: ConfigVersion,

    #[serde(default)]
    #[validate(nested)]
    pub broker: BrokerConfig,

    #[serde(default)]
    pub export: ExportConfig,

    #[serde(default)]
    #[validate(nested)]
    pub supervision: SupervisionConfig,

    /// Devices and their sensors (seeds the sensor registry)
    #[serde(default)]
    #[validate(nested)]
    pub devices: Vec<DeviceConfig>,
}

/// Broker topic layout
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct BrokerConfig {
    /// Topic carrying connect/disconnect events for all devices
    #[serde(default = "default_connectivity_topic")]
    #[validate(length(min = 1, message = "connectivity topic cannot be empty"))]
    pub connectivity_topic: String,

    /// Per-device telemetry topic is `{prefix}{device_id}`
    #[serde(default = "default_telemetry_topic_prefix")]
    #[validate(length(min = 1, message = "telemetry topic prefix cannot be empty"))]
    pub telemetry_topic_prefix: String,

    /// Per-subscription queue capacity of the in-process bus
    #[serde(default = "default_channel_capacity")]
    #[validate(range(min = 1, message = "channel capacity must be >= 1"))]
    pub channel_capacity: usize,
}

impl BrokerConfig {
    /// Telemetry topic of one device
    pub fn telemetry_topic(&self, device_id: &DeviceId) -> String {
        format!("{}{}", self.telemetry_topic_prefix, device_id)
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            connectivity_topic: default_connectivity_topic(),
            telemetry_topic_prefix: default_telemetry_topic_prefix(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

fn default_connectivity_topic() -> String {
    "device-connectivity".to_string()
}

fn default_telemetry_topic_prefix() -> String {
    "device-telemetry-".to_string()
}

fn default_channel_capacity() -> usize {
    1024
}

/// CSV export location
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Files land in `{root}/{device_id}/{session_name}.csv`
    #[serde(default = "default_export_root")]
    pub root: PathBuf,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            root: default_export_root(),
        }
    }
}

fn default_export_root() -> PathBuf {
    PathBuf::from("./srv_files")
}

/// Active session supervision
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SupervisionConfig {
    /// Reject a connect event for a device that already has an open session
    #[serde(default = "default_true")]
    pub reject_duplicate_connect: bool,

    /// Upper bound on concurrently active sessions (None = unbounded)
    #[serde(default)]
    #[validate(range(min = 1, message = "max_active_sessions must be >= 1"))]
    pub max_active_sessions: Option<usize>,

    /// Largest device tick a session may reconstruct. Sessions that report a
    /// later tick fail instead of allocating the dense series.
    #[serde(default = "default_max_session_ticks")]
    #[validate(range(min = 1, message = "max_session_ticks must be >= 1"))]
    pub max_session_ticks: u64,
}

impl Default for SupervisionConfig {
    fn default() -> Self {
        Self {
            reject_duplicate_connect: true,
            max_active_sessions: None,
            max_session_ticks: default_max_session_ticks(),
        }
    }
}

fn default_true() -> bool {
    true
}

/// One hour of millisecond ticks
pub const DEFAULT_MAX_SESSION_TICKS: u64 = 3_600_000;

fn default_max_session_ticks() -> u64 {
    DEFAULT_MAX_SESSION_TICKS
}

/// Registered device
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DeviceConfig {
    pub id: DeviceId,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    #[validate(nested)]
    pub sensors: Vec<SensorConfig>,
}

/// Registered sensor
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SensorConfig {
    #[serde(default = "Uuid::new_v4")]
    pub sensor_id: Uuid,

    #[validate(length(min = 1, message = "sensor name cannot be empty"))]
    pub name: String,

    pub compact_key: ChannelKey,
}

impl From<&SensorConfig> for SensorInfo {
    fn from(config: &SensorConfig) -> Self {
        SensorInfo {
            sensor_id: config.sensor_id,
            name: config.name.clone(),
            compact_key: config.compact_key,
        }
    }
}
