//! Raw and reconstructed telemetry
//!
//! `RawSample` is what a device sends; `DenseSeries` is what the reconstructor
//! produces: one row per tick, no gaps.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::ChannelKey;

/// Channel values of one row, ordered by compact key
pub type ChannelValues = BTreeMap<ChannelKey, i64>;

/// One arrived data message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawSample {
    pub tick: u64,
    pub channels: ChannelValues,
}

impl RawSample {
    pub fn new(tick: u64, channels: ChannelValues) -> Self {
        Self { tick, channels }
    }

    /// Build from `(key, value)` pairs
    pub fn from_pairs(tick: u64, pairs: impl IntoIterator<Item = (u32, i64)>) -> Self {
        Self {
            tick,
            channels: pairs
                .into_iter()
                .map(|(k, v)| (ChannelKey::new(k), v))
                .collect(),
        }
    }
}

/// One reconstructed row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DenseRow {
    pub tick: u64,
    pub channels: ChannelValues,
}

/// Tick-indexed series with no missing ticks.
///
/// Row `i` always has `tick == i`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DenseSeries {
    rows: Vec<DenseRow>,
}

impl DenseSeries {
    /// Wrap rows already known to be contiguous from tick 0
    pub fn from_rows(rows: Vec<DenseRow>) -> Self {
        debug_assert!(rows.iter().enumerate().all(|(i, r)| r.tick == i as u64));
        Self { rows }
    }

    pub fn rows(&self) -> &[DenseRow] {
        &self.rows
    }

    pub fn iter(&self) -> impl Iterator<Item = &DenseRow> {
        self.rows.iter()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Tick of the last row
    pub fn max_tick(&self) -> Option<u64> {
        self.rows.last().map(|r| r.tick)
    }

    /// Distinct channel keys across all rows, ascending
    pub fn channel_keys(&self) -> BTreeSet<ChannelKey> {
        self.rows
            .iter()
            .flat_map(|r| r.channels.keys().copied())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(tick: u64, pairs: &[(u32, i64)]) -> DenseRow {
        DenseRow {
            tick,
            channels: pairs
                .iter()
                .map(|&(k, v)| (ChannelKey::new(k), v))
                .collect(),
        }
    }

    #[test]
    fn test_channel_keys_union() {
        let series = DenseSeries::from_rows(vec![
            row(0, &[(3, 1)]),
            row(1, &[(3, 1), (1, 4)]),
        ]);
        let keys: Vec<u32> = series.channel_keys().into_iter().map(|k| k.get()).collect();
        assert_eq!(keys, vec![1, 3]);
        assert_eq!(series.max_tick(), Some(1));
    }

    #[test]
    fn test_empty_series() {
        let series = DenseSeries::default();
        assert!(series.is_empty());
        assert_eq!(series.max_tick(), None);
    }
}
