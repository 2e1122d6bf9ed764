//! Temporal fill: zero-order hold over every integer tick.

use std::collections::BTreeMap;

use contracts::{ChannelValues, DenseRow, DenseSeries, RawSample};

use crate::ReconstructError;

/// Temporal fill output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemporalFill {
    pub series: DenseSeries,
    pub out_of_order: usize,
    pub overwritten: usize,
    pub dropped: usize,
}

/// Expand laterally filled rows into one row per tick in `0..=last.tick`.
///
/// - a tick with an arrival takes that arrival's channels (last arrival wins
///   when several share a tick)
/// - a tick without one repeats the previous dense row
/// - ticks before the earliest arrival hold that arrival's keys at `0`
///
/// `last` is the last row in arrival order. Rows with a larger tick are
/// outside the dense range and are only counted.
///
/// # Errors
/// - `ReconstructError::InputEmpty` when `rows` is empty
/// - `ReconstructError::TickOutOfRange` when `last.tick > max_tick`, or the
///   dense range cannot be allocated
pub fn temporal_fill(rows: &[RawSample], max_tick: u64) -> Result<TemporalFill, ReconstructError> {
    let last_tick = rows.last().ok_or(ReconstructError::InputEmpty)?.tick;
    let out_of_range = ReconstructError::TickOutOfRange {
        tick: last_tick,
        limit: max_tick,
    };
    if last_tick > max_tick {
        return Err(out_of_range);
    }
    let len = usize::try_from(last_tick)
        .ok()
        .and_then(|t| t.checked_add(1))
        .ok_or_else(|| out_of_range.clone())?;

    let mut arrivals: BTreeMap<u64, &ChannelValues> = BTreeMap::new();
    let mut out_of_order = 0;
    let mut overwritten = 0;
    let mut dropped = 0;
    let mut highest: Option<u64> = None;

    for row in rows {
        if highest.is_some_and(|h| row.tick < h) {
            out_of_order += 1;
        }
        highest = Some(highest.map_or(row.tick, |h| h.max(row.tick)));

        if row.tick > last_tick {
            dropped += 1;
            continue;
        }
        if arrivals.insert(row.tick, &row.channels).is_some() {
            overwritten += 1;
        }
    }

    let mut held: ChannelValues = arrivals
        .values()
        .next()
        .map(|earliest| earliest.keys().map(|k| (*k, 0)).collect())
        .unwrap_or_default();

    let mut pending = arrivals.into_iter().peekable();
    let mut dense: Vec<DenseRow> = Vec::new();
    dense.try_reserve_exact(len).map_err(|_| out_of_range)?;
    for tick in 0..=last_tick {
        if let Some((_, channels)) = pending.next_if(|(t, _)| *t == tick) {
            held = channels.clone();
        }
        dense.push(DenseRow {
            tick,
            channels: held.clone(),
        });
    }

    Ok(TemporalFill {
        series: DenseSeries::from_rows(dense),
        out_of_order,
        overwritten,
        dropped,
    })
}
