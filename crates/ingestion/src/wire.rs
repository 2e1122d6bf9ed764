//! Wire format of broker payloads
//!
//! Connectivity topic: `{"active": bool, "device": "<uuid>"}` (`THING` is
//! accepted in place of `device`).
//!
//! Telemetry topic, two shapes told apart by field presence:
//! - control: `{"active": false}`
//! - data: `{"1": 812, "4": -3, "ts": 120}`

use bytes::Bytes;
use contracts::{ChannelKey, ChannelValues, ContractError, DeviceId, RawSample};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Field carrying the device tick in data messages
pub const TICK_FIELD: &str = "ts";

const ACTIVE_FIELD: &str = "active";

/// Connect/disconnect announcement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectivityEvent {
    pub active: bool,
    #[serde(alias = "THING")]
    pub device: String,
}

impl ConnectivityEvent {
    /// Parse the announced device identifier
    pub fn device_id(&self) -> Result<DeviceId, ContractError> {
        self.device.parse()
    }
}

/// Per-device telemetry message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TelemetryMessage {
    /// Connection state change; `active == false` ends the session
    Control { active: bool },
    /// One sample
    Data(RawSample),
}

impl TelemetryMessage {
    pub fn is_disconnect(&self) -> bool {
        matches!(self, Self::Control { active: false })
    }
}

/// Decode a connectivity payload
///
/// # Errors
/// `ControlMessageMalformed` for anything that is not the expected object.
pub fn decode_connectivity(topic: &str, payload: &[u8]) -> Result<ConnectivityEvent, ContractError> {
    serde_json::from_slice(payload).map_err(|e| ContractError::malformed(topic, e.to_string()))
}

/// Decode a telemetry payload
///
/// # Errors
/// `ControlMessageMalformed` when the payload is not a JSON object, carries
/// neither `active` nor `ts`, has a non-numeric channel key, or a value that
/// is not an integer.
pub fn decode_telemetry(topic: &str, payload: &[u8]) -> Result<TelemetryMessage, ContractError> {
    let value: Value =
        serde_json::from_slice(payload).map_err(|e| ContractError::malformed(topic, e.to_string()))?;
    let Value::Object(object) = value else {
        return Err(ContractError::malformed(topic, "payload is not a JSON object"));
    };

    if let Some(active) = object.get(ACTIVE_FIELD) {
        return active
            .as_bool()
            .map(|active| TelemetryMessage::Control { active })
            .ok_or_else(|| ContractError::malformed(topic, "'active' must be a boolean"));
    }

    decode_data(topic, object).map(TelemetryMessage::Data)
}

fn decode_data(topic: &str, object: Map<String, Value>) -> Result<RawSample, ContractError> {
    let mut tick = None;
    let mut channels = ChannelValues::new();

    for (field, value) in object {
        if field == TICK_FIELD {
            tick = Some(value.as_u64().ok_or_else(|| {
                ContractError::malformed(topic, format!("'ts' must be a non-negative integer, got {value}"))
            })?);
            continue;
        }

        let key: ChannelKey = field.parse().map_err(|_| {
            ContractError::malformed(topic, format!("channel key '{field}' is not numeric"))
        })?;
        let reading = value.as_i64().ok_or_else(|| {
            ContractError::malformed(topic, format!("channel {key} value {value} is not an integer"))
        })?;
        channels.insert(key, reading);
    }

    let tick = tick.ok_or_else(|| {
        ContractError::malformed(topic, "message has neither 'active' nor 'ts'")
    })?;

    Ok(RawSample::new(tick, channels))
}

/// Encode a connectivity event
pub fn encode_connectivity(active: bool, device: &DeviceId) -> Bytes {
    let event = ConnectivityEvent {
        active,
        device: device.to_string(),
    };
    Bytes::from(serde_json::to_vec(&event).unwrap_or_default())
}

/// Encode a control message for a telemetry topic
pub fn encode_control(active: bool) -> Bytes {
    Bytes::from(serde_json::json!({ ACTIVE_FIELD: active }).to_string())
}

/// Encode a data message for a telemetry topic
pub fn encode_data(sample: &RawSample) -> Bytes {
    let mut object = Map::new();
    for (key, value) in &sample.channels {
        object.insert(key.to_string(), Value::from(*value));
    }
    object.insert(TICK_FIELD.to_string(), Value::from(sample.tick));
    Bytes::from(Value::Object(object).to_string())
}
