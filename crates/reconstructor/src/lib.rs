//! # Reconstructor
//!
//! Turns an arrival-ordered sequence of sparse samples into a dense,
//! tick-indexed series.
//!
//! Two passes:
//! - **lateral fill**: each arrival inherits the last known value of every
//!   channel seen so far (forward only, never back-filled)
//! - **temporal fill**: zero-order hold over every integer tick from 0 to the
//!   last arrival's tick
//!
//! Delivery order is authoritative. Nothing is resequenced by tick; arrivals
//! that land outside the dense range are counted and dropped.
//!
//! ## Example
//!
//! ```
//! use contracts::RawSample;
//! use reconstructor::reconstruct;
//!
//! let samples = vec![
//!     RawSample::from_pairs(0, [(1, 10)]),
//!     RawSample::from_pairs(2, [(1, 12), (2, 5)]),
//! ];
//!
//! let output = reconstruct(&samples).unwrap();
//! assert_eq!(output.series.len(), 3);
//! assert_eq!(output.series.rows()[1].channels, output.series.rows()[0].channels);
//! ```

mod error;
mod lateral;
mod temporal;

pub use error::ReconstructError;
pub use lateral::lateral_fill;
pub use temporal::{temporal_fill, TemporalFill};

use contracts::{DenseSeries, RawSample, DEFAULT_MAX_SESSION_TICKS};
use tracing::{debug, warn};

/// Reconstruction counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconstructionStats {
    /// Arrived samples
    pub samples: usize,
    /// Dense rows produced (`last tick + 1`)
    pub rows: usize,
    /// Distinct channel keys
    pub channels: usize,
    /// Arrivals whose tick was lower than an earlier arrival's
    pub out_of_order: usize,
    /// Arrivals sharing a tick with a later arrival (later one kept)
    pub overwritten: usize,
    /// Arrivals beyond the last arrival's tick, outside the dense range
    pub dropped: usize,
    /// Largest tick among all arrivals
    pub max_observed_tick: u64,
}

/// Dense output plus counters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconstruction {
    pub series: DenseSeries,
    pub stats: ReconstructionStats,
}

/// Run lateral then temporal fill, bounded by `DEFAULT_MAX_SESSION_TICKS`.
///
/// # Errors
/// `ReconstructError::InputEmpty` when `samples` is empty.
pub fn reconstruct(samples: &[RawSample]) -> Result<Reconstruction, ReconstructError> {
    reconstruct_bounded(samples, DEFAULT_MAX_SESSION_TICKS)
}

/// Run lateral then temporal fill; the last arrival's tick may not exceed
/// `max_tick`.
///
/// # Errors
/// - `ReconstructError::InputEmpty` when `samples` is empty
/// - `ReconstructError::TickOutOfRange` when the dense range is past
///   `max_tick` (checked before anything is allocated)
pub fn reconstruct_bounded(
    samples: &[RawSample],
    max_tick: u64,
) -> Result<Reconstruction, ReconstructError> {
    // 1. reject an oversized range before the lateral copy
    let last_tick = samples.last().ok_or(ReconstructError::InputEmpty)?.tick;
    if last_tick > max_tick {
        return Err(ReconstructError::TickOutOfRange {
            tick: last_tick,
            limit: max_tick,
        });
    }

    // 2. lateral carry, then zero-order hold
    let lateral = lateral_fill(samples)?;
    let temporal = temporal_fill(&lateral, max_tick)?;

    let stats = ReconstructionStats {
        samples: samples.len(),
        rows: temporal.series.len(),
        channels: temporal.series.channel_keys().len(),
        out_of_order: temporal.out_of_order,
        overwritten: temporal.overwritten,
        dropped: temporal.dropped,
        max_observed_tick: samples.iter().map(|s| s.tick).max().unwrap_or(0),
    };

    if stats.dropped > 0 || stats.out_of_order > 0 {
        warn!(
            out_of_order = stats.out_of_order,
            dropped = stats.dropped,
            "Telemetry arrived out of tick order"
        );
    }

    debug!(
        samples = stats.samples,
        rows = stats.rows,
        channels = stats.channels,
        "Reconstruction complete"
    );

    Ok(Reconstruction {
        series: temporal.series,
        stats,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{ChannelKey, ChannelValues};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::collections::BTreeSet;

    fn random_samples(rng: &mut StdRng, count: usize) -> Vec<RawSample> {
        let mut tick = 0u64;
        (0..count)
            .map(|_| {
                tick += rng.random_range(0..5u64);
                let mut channels = ChannelValues::new();
                for key in 1..=6u32 {
                    if rng.random_bool(0.4) {
                        channels.insert(ChannelKey::new(key), rng.random_range(-1000..1000i64));
                    }
                }
                RawSample::new(tick, channels)
            })
            .collect()
    }

    #[test]
    fn test_spec_example() {
        let samples = vec![
            RawSample::from_pairs(0, [(1, 10)]),
            RawSample::from_pairs(2, [(1, 12), (2, 5)]),
        ];

        let output = reconstruct(&samples).unwrap();
        let rows = output.series.rows();

        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].channels, RawSample::from_pairs(0, [(1, 10)]).channels);
        assert_eq!(rows[1].channels, RawSample::from_pairs(0, [(1, 10)]).channels);
        assert_eq!(
            rows[2].channels,
            RawSample::from_pairs(0, [(1, 12), (2, 5)]).channels
        );
        assert_eq!(output.stats.max_observed_tick, 2);
        assert_eq!(output.stats.channels, 2);
    }

    #[test]
    fn test_empty_input() {
        assert!(matches!(reconstruct(&[]), Err(ReconstructError::InputEmpty)));
    }

    #[test]
    fn test_idempotent() {
        let mut rng = StdRng::seed_from_u64(7);
        let samples = random_samples(&mut rng, 200);

        let first = reconstruct(&samples).unwrap();
        let second = reconstruct(&samples).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_random_inputs_are_dense_and_contiguous() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..50 {
            let count = rng.random_range(1..80usize);
            let samples = random_samples(&mut rng, count);
            let last_tick = samples.last().map(|s| s.tick).unwrap();

            let output = reconstruct(&samples).unwrap();
            assert_eq!(output.series.len() as u64, last_tick + 1);
            for (i, row) in output.series.iter().enumerate() {
                assert_eq!(row.tick, i as u64);
            }
        }
    }

    #[test]
    fn test_random_inputs_lateral_union() {
        let mut rng = StdRng::seed_from_u64(1234);
        let samples = random_samples(&mut rng, 100);
        let filled = lateral_fill(&samples).unwrap();

        let mut seen = BTreeSet::new();
        for (raw, row) in samples.iter().zip(&filled) {
            seen.extend(raw.channels.keys().copied());
            let keys: BTreeSet<_> = row.channels.keys().copied().collect();
            assert_eq!(keys, seen);
        }
    }

    #[test]
    fn test_huge_tick_is_rejected() {
        let samples = vec![RawSample::from_pairs(1u64 << 40, [(1, 1)])];
        assert_eq!(
            reconstruct(&samples),
            Err(ReconstructError::TickOutOfRange {
                tick: 1 << 40,
                limit: DEFAULT_MAX_SESSION_TICKS
            })
        );
    }

    #[test]
    fn test_bounded_limit_applies_to_last_arrival() {
        // dropped arrivals past the dense range do not count against the bound
        let samples = vec![
            RawSample::from_pairs(500, [(1, 1)]),
            RawSample::from_pairs(10, [(1, 2)]),
        ];
        let output = reconstruct_bounded(&samples, 100).unwrap();
        assert_eq!(output.series.len(), 11);
        assert_eq!(output.stats.dropped, 1);
        assert_eq!(output.stats.max_observed_tick, 500);

        let samples = vec![RawSample::from_pairs(101, [(1, 1)])];
        assert!(matches!(
            reconstruct_bounded(&samples, 100),
            Err(ReconstructError::TickOutOfRange { tick: 101, limit: 100 })
        ));
    }

    #[test]
    fn test_converts_into_contract_error() {
        let err: contracts::ContractError = ReconstructError::InputEmpty.into();
        assert!(matches!(
            err,
            contracts::ContractError::ReconstructionInputEmpty
        ));
    }
}
