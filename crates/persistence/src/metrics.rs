//! Persistence counters

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters shared by every sink of a process
#[derive(Debug, Default)]
pub struct PersistenceMetrics {
    /// Datums accepted by the datum store
    datums_written: AtomicU64,
    /// Failed bulk inserts
    insert_failures: AtomicU64,
    /// CSV files written
    exports_written: AtomicU64,
    /// CSV files that could not be written
    export_failures: AtomicU64,
    /// Channel keys without a registered sensor
    unresolved_channels: AtomicU64,
}

impl PersistenceMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn datums_written(&self) -> u64 {
        self.datums_written.load(Ordering::Relaxed)
    }

    pub fn add_datums_written(&self, count: u64) {
        self.datums_written.fetch_add(count, Ordering::Relaxed);
    }

    pub fn insert_failures(&self) -> u64 {
        self.insert_failures.load(Ordering::Relaxed)
    }

    pub fn inc_insert_failures(&self) {
        self.insert_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn exports_written(&self) -> u64 {
        self.exports_written.load(Ordering::Relaxed)
    }

    pub fn inc_exports_written(&self) {
        self.exports_written.fetch_add(1, Ordering::Relaxed);
    }

    pub fn export_failures(&self) -> u64 {
        self.export_failures.load(Ordering::Relaxed)
    }

    pub fn inc_export_failures(&self) {
        self.export_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn unresolved_channels(&self) -> u64 {
        self.unresolved_channels.load(Ordering::Relaxed)
    }

    pub fn add_unresolved_channels(&self, count: u64) {
        self.unresolved_channels.fetch_add(count, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> PersistenceMetricsSnapshot {
        PersistenceMetricsSnapshot {
            datums_written: self.datums_written(),
            insert_failures: self.insert_failures(),
            exports_written: self.exports_written(),
            export_failures: self.export_failures(),
            unresolved_channels: self.unresolved_channels(),
        }
    }
}

/// Snapshot of persistence counters (for reporting)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PersistenceMetricsSnapshot {
    pub datums_written: u64,
    pub insert_failures: u64,
    pub exports_written: u64,
    pub export_failures: u64,
    pub unresolved_channels: u64,
}
