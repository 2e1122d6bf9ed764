//! ChannelResolver - compact channel key to registered sensor

use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use contracts::{ChannelKey, ContractError, DeviceId, SensorInfo, SensorRegistry};
use tracing::{debug, instrument, warn};

use crate::store_failure;

/// Channel keys of one session split by registry membership
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelMapping {
    pub resolved: BTreeMap<ChannelKey, SensorInfo>,
    pub unresolved: BTreeSet<ChannelKey>,
}

impl ChannelMapping {
    /// Mapping with no registry behind it: every key exported raw
    pub fn raw_only(keys: BTreeSet<ChannelKey>) -> Self {
        Self {
            resolved: BTreeMap::new(),
            unresolved: keys,
        }
    }

    /// Registered sensor of a key
    pub fn sensor(&self, key: &ChannelKey) -> Option<&SensorInfo> {
        self.resolved.get(key)
    }

    /// CSV column name: sensor name when resolved, raw key otherwise
    pub fn column_name(&self, key: &ChannelKey) -> Cow<'_, str> {
        match self.resolved.get(key) {
            Some(info) => Cow::Borrowed(info.name.as_str()),
            None => Cow::Owned(key.to_string()),
        }
    }

    /// Every known key, ascending
    pub fn keys(&self) -> Vec<ChannelKey> {
        let mut keys: Vec<ChannelKey> = self
            .resolved
            .keys()
            .chain(self.unresolved.iter())
            .copied()
            .collect();
        keys.sort_unstable();
        keys
    }

    pub fn is_fully_resolved(&self) -> bool {
        self.unresolved.is_empty()
    }
}

/// Resolves a session's channel keys against the sensor registry
pub struct ChannelResolver<R> {
    registry: Arc<R>,
}

impl<R> Clone for ChannelResolver<R> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
        }
    }
}

impl<R: SensorRegistry + Sync> ChannelResolver<R> {
    pub fn new(registry: Arc<R>) -> Self {
        Self { registry }
    }

    /// Look up the device's sensors once and map every observed key.
    ///
    /// Keys without a registered sensor are kept as unresolved; that is not
    /// an error.
    ///
    /// # Errors
    /// `SessionPersistenceFailure` when the registry call itself fails.
    #[instrument(
        name = "channel_resolver_resolve",
        skip(self, keys),
        fields(device_id = %device_id, keys = keys.len())
    )]
    pub async fn resolve(
        &self,
        device_id: DeviceId,
        keys: &BTreeSet<ChannelKey>,
    ) -> Result<ChannelMapping, ContractError> {
        let sensors = self
            .registry
            .find_all_by_device(device_id)
            .await
            .map_err(|e| store_failure("find_all_by_device", e))?;

        let by_key: HashMap<ChannelKey, SensorInfo> = sensors
            .into_iter()
            .map(|sensor| (sensor.compact_key, sensor))
            .collect();

        let mut mapping = ChannelMapping::default();
        for key in keys {
            match by_key.get(key) {
                Some(info) => {
                    mapping.resolved.insert(*key, info.clone());
                }
                None => {
                    let err = ContractError::RegistryLookupFailure {
                        device_id: device_id.to_string(),
                        key: key.get(),
                    };
                    warn!(error = %err, "Channel exported under its raw key, no datums");
                    mapping.unresolved.insert(*key);
                }
            }
        }

        debug!(
            resolved = mapping.resolved.len(),
            unresolved = mapping.unresolved.len(),
            "Channels resolved"
        );

        Ok(mapping)
    }
}
