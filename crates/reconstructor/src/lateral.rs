//! Lateral fill: carry the last known value of every channel forward.

use contracts::{ChannelValues, RawSample};

use crate::ReconstructError;

/// Fill each arrival with every channel seen in earlier arrivals.
///
/// The running map is seeded from the first sample. A key that first shows
/// up in sample `i` is absent from rows `0..i`; it is never back-filled.
/// Output row `i` therefore holds exactly the union of keys of samples `0..=i`.
///
/// # Errors
/// `ReconstructError::InputEmpty` when `samples` is empty.
pub fn lateral_fill(samples: &[RawSample]) -> Result<Vec<RawSample>, ReconstructError> {
    let (first, rest) = samples.split_first().ok_or(ReconstructError::InputEmpty)?;

    let mut running: ChannelValues = first.channels.clone();
    let mut rows = Vec::with_capacity(samples.len());
    rows.push(first.clone());

    for sample in rest {
        let mut row = sample.clone();
        for (key, value) in &running {
            row.channels.entry(*key).or_insert(*value);
        }
        for (key, value) in &sample.channels {
            running.insert(*key, *value);
        }
        rows.push(row);
    }

    Ok(rows)
}
