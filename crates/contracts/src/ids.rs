//! Identifiers: device identity and compact channel keys

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::ContractError;

/// Device (thing) identifier.
///
/// Devices announce themselves with a UUID string; anything that does not
/// parse as a UUID is rejected at the connect event.
///
/// # Examples
/// ```
/// use contracts::DeviceId;
///
/// let id: DeviceId = "5b3e6f0a-8d7c-4c1e-9a43-2f1d7e0b9c11".parse().unwrap();
/// assert_eq!(id.to_string(), "5b3e6f0a-8d7c-4c1e-9a43-2f1d7e0b9c11");
/// assert!("not-a-device".parse::<DeviceId>().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(Uuid);

impl DeviceId {
    /// Wrap an existing UUID
    #[inline]
    pub fn new(id: Uuid) -> Self {
        Self(id)
    }

    /// Generate a random device id
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }
}

impl FromStr for DeviceId {
    type Err = ContractError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|_| ContractError::DeviceIdentifierInvalid { raw: s.to_string() })
    }
}

impl From<Uuid> for DeviceId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Compact channel key.
///
/// Devices substitute a short numeric key for the full sensor identity to keep
/// payloads small. Keys order numerically, so `2` sorts before `10`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelKey(u32);

impl ChannelKey {
    #[inline]
    pub const fn new(key: u32) -> Self {
        Self(key)
    }

    #[inline]
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl From<u32> for ChannelKey {
    #[inline]
    fn from(key: u32) -> Self {
        Self(key)
    }
}

impl FromStr for ChannelKey {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<u32>().map(Self)
    }
}

impl fmt::Display for ChannelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_device_id_parse() {
        let raw = "5b3e6f0a-8d7c-4c1e-9a43-2f1d7e0b9c11";
        let id: DeviceId = raw.parse().unwrap();
        assert_eq!(id.to_string(), raw);
    }

    #[test]
    fn test_device_id_invalid() {
        let err = "thing-42".parse::<DeviceId>().unwrap_err();
        assert!(matches!(err, ContractError::DeviceIdentifierInvalid { .. }));
    }

    #[test]
    fn test_channel_keys_order_numerically() {
        let mut keys: Vec<ChannelKey> = ["10", "2", "1"]
            .iter()
            .map(|s| s.parse().unwrap())
            .collect();
        keys.sort();
        assert_eq!(keys, vec![1.into(), 2.into(), 10.into()]);
    }

    #[test]
    fn test_channel_key_as_json_map_key() {
        let mut map = BTreeMap::new();
        map.insert(ChannelKey::new(3), 7i64);
        let json = serde_json::to_string(&map).unwrap();
        assert_eq!(json, r#"{"3":7}"#);

        let parsed: BTreeMap<ChannelKey, i64> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, map);
    }
}
