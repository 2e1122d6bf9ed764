//! # Persistence
//!
//! Everything that happens to a reconstructed series once a device has
//! disconnected.
//!
//! Responsibilities:
//! - Resolve compact channel keys to registered sensors
//! - Bulk-insert one datum per (row, resolved channel)
//! - Export the full dense matrix as CSV (best effort)
//! - Close the session with its end time
//!
//! `MemoryStore` implements all three collaborator traits in memory.

pub mod csv;
mod error;
pub mod memory;
pub mod metrics;
pub mod resolver;
pub mod sink;

pub use csv::{parse_csv, render_csv, CsvExporter, CsvRow, ParsedCsv, TIMESTAMP_HEADER};
pub use error::{PersistenceError, Result};
pub use memory::{MemoryFaults, MemoryStore};
pub use metrics::{PersistenceMetrics, PersistenceMetricsSnapshot};
pub use resolver::{ChannelMapping, ChannelResolver};
pub use sink::{build_datums, PersistenceSink, SinkReport};

use contracts::ContractError;

/// Wrap a collaborator failure as a session persistence failure
pub(crate) fn store_failure(operation: &str, err: ContractError) -> ContractError {
    match err {
        err @ ContractError::SessionPersistenceFailure { .. } => err,
        other => ContractError::persistence(operation, other.to_string()),
    }
}
