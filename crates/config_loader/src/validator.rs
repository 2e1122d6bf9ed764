//! Config validation
//!
//! Field rules come from the `validator` derive on the config types; the
//! cross-field rules live here:
//! - device ids unique
//! - compact keys unique per device
//! - sensor names unique per device (they become CSV headers)

use std::collections::HashSet;

use contracts::{ContractError, ServiceConfig};
use validator::Validate;

/// Validate a ServiceConfig
///
/// Returns the first error encountered.
pub fn validate(config: &ServiceConfig) -> Result<(), ContractError> {
    validate_fields(config)?;
    validate_device_ids(config)?;
    validate_sensor_keys(config)?;
    validate_sensor_names(config)?;
    Ok(())
}

fn validate_fields(config: &ServiceConfig) -> Result<(), ContractError> {
    config.validate().map_err(|errors| {
        let field = errors
            .field_errors()
            .keys()
            .next()
            .map(|k| k.to_string())
            .unwrap_or_else(|| "config".to_string());
        ContractError::config_validation(field, errors.to_string())
    })
}

fn validate_device_ids(config: &ServiceConfig) -> Result<(), ContractError> {
    let mut seen = HashSet::new();
    for device in &config.devices {
        if !seen.insert(device.id) {
            return Err(ContractError::config_validation(
                format!("devices[id={}]", device.id),
                "duplicate device id",
            ));
        }
    }
    Ok(())
}

fn validate_sensor_keys(config: &ServiceConfig) -> Result<(), ContractError> {
    for device in &config.devices {
        let mut seen = HashSet::new();
        for sensor in &device.sensors {
            if !seen.insert(sensor.compact_key) {
                return Err(ContractError::config_validation(
                    format!("devices[{}].sensors[compact_key={}]", device.id, sensor.compact_key),
                    "duplicate compact_key",
                ));
            }
        }
    }
    Ok(())
}

fn validate_sensor_names(config: &ServiceConfig) -> Result<(), ContractError> {
    for device in &config.devices {
        let mut seen = HashSet::new();
        for sensor in &device.sensors {
            if !seen.insert(sensor.name.as_str()) {
                return Err(ContractError::config_validation(
                    format!("devices[{}].sensors[name={}]", device.id, sensor.name),
                    "duplicate sensor name",
                ));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{ChannelKey, DeviceConfig, DeviceId, SensorConfig};
    use uuid::Uuid;

    fn sensor(name: &str, key: u32) -> SensorConfig {
        SensorConfig {
            sensor_id: Uuid::new_v4(),
            name: name.into(),
            compact_key: ChannelKey::new(key),
        }
    }

    fn minimal_config() -> ServiceConfig {
        ServiceConfig {
            devices: vec![DeviceConfig {
                id: DeviceId::random(),
                name: "car-01".into(),
                sensors: vec![sensor("engine_rpm", 1), sensor("speed", 2)],
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(validate(&minimal_config()).is_ok());
    }

    #[test]
    fn test_duplicate_device_id() {
        let mut config = minimal_config();
        config.devices.push(config.devices[0].clone());
        let err = validate(&config).unwrap_err().to_string();
        assert!(err.contains("duplicate device id"), "got: {err}");
    }

    #[test]
    fn test_duplicate_compact_key() {
        let mut config = minimal_config();
        config.devices[0].sensors.push(sensor("throttle", 1));
        let err = validate(&config).unwrap_err().to_string();
        assert!(err.contains("duplicate compact_key"), "got: {err}");
    }

    #[test]
    fn test_duplicate_sensor_name() {
        let mut config = minimal_config();
        config.devices[0].sensors.push(sensor("speed", 9));
        let err = validate(&config).unwrap_err().to_string();
        assert!(err.contains("duplicate sensor name"), "got: {err}");
    }

    #[test]
    fn test_same_key_on_different_devices_is_fine() {
        let mut config = minimal_config();
        config.devices.push(DeviceConfig {
            id: DeviceId::random(),
            name: "car-02".into(),
            sensors: vec![sensor("engine_rpm", 1)],
        });
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_empty_sensor_name() {
        let mut config = minimal_config();
        config.devices[0].sensors[0].name = String::new();
        let err = validate(&config).unwrap_err().to_string();
        assert!(err.contains("cannot be empty"), "got: {err}");
    }

    #[test]
    fn test_zero_channel_capacity() {
        let mut config = minimal_config();
        config.broker.channel_capacity = 0;
        let result = validate(&config);
        assert!(matches!(result, Err(ContractError::ConfigValidation { .. })));
    }
}
