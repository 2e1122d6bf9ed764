//! PersistenceSink - datums, CSV export and session close

use std::path::PathBuf;
use std::sync::Arc;

use contracts::{ContractError, Datum, DatumStore, DenseSeries, Session, SessionStore};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::{store_failure, ChannelMapping, CsvExporter, PersistenceMetrics};

/// What one `persist` call wrote
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkReport {
    /// The session as closed by the store
    pub session: Session,
    /// Datums accepted by the datum store
    pub datums: usize,
    /// Export path, `None` when the CSV could not be written
    pub csv_path: Option<PathBuf>,
}

/// One datum per (row, resolved channel).
///
/// Unresolved channels produce none. A resolved channel that has no value in
/// a row (it first appeared later) is skipped for that row.
pub fn build_datums(session_id: Uuid, series: &DenseSeries, mapping: &ChannelMapping) -> Vec<Datum> {
    series
        .iter()
        .flat_map(|row| {
            mapping.resolved.iter().filter_map(move |(key, sensor)| {
                row.channels.get(key).map(|&value| Datum {
                    session_id,
                    sensor_id: sensor.sensor_id,
                    timestamp: row.tick,
                    value,
                })
            })
        })
        .collect()
}

/// Writes a reconstructed session to its stores and to disk
pub struct PersistenceSink<S, D> {
    sessions: Arc<S>,
    datums: Arc<D>,
    exporter: CsvExporter,
    metrics: Arc<PersistenceMetrics>,
}

impl<S, D> Clone for PersistenceSink<S, D> {
    fn clone(&self) -> Self {
        Self {
            sessions: Arc::clone(&self.sessions),
            datums: Arc::clone(&self.datums),
            exporter: self.exporter.clone(),
            metrics: Arc::clone(&self.metrics),
        }
    }
}

impl<S, D> PersistenceSink<S, D>
where
    S: SessionStore + Sync,
    D: DatumStore + Sync,
{
    pub fn new(sessions: Arc<S>, datums: Arc<D>, exporter: CsvExporter) -> Self {
        Self {
            sessions,
            datums,
            exporter,
            metrics: Arc::new(PersistenceMetrics::new()),
        }
    }

    /// Share counters with other sinks
    pub fn with_metrics(mut self, metrics: Arc<PersistenceMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> &Arc<PersistenceMetrics> {
        &self.metrics
    }

    pub fn exporter(&self) -> &CsvExporter {
        &self.exporter
    }

    /// Persist a reconstructed session.
    ///
    /// The session is re-read first so the export uses its current name.
    /// Datums go in with a single bulk insert; the CSV is written whether or
    /// not that insert succeeded, and its failure is only logged. The session
    /// is closed with `start_time + max_observed_tick` only after a
    /// successful insert.
    ///
    /// # Errors
    /// `SessionPersistenceFailure` when re-reading, inserting or closing
    /// fails. The session is left open in that case.
    #[instrument(
        name = "persistence_sink_persist",
        skip(self, session, series, mapping),
        fields(session_id = %session.id, device_id = %session.device_id, rows = series.len())
    )]
    pub async fn persist(
        &self,
        session: &Session,
        series: &DenseSeries,
        mapping: &ChannelMapping,
        max_observed_tick: u64,
    ) -> Result<SinkReport, ContractError> {
        // 1. Re-read: the session may have been renamed since creation
        let session = self.current(session).await?;

        self.metrics
            .add_unresolved_channels(mapping.unresolved.len() as u64);

        // 2. One bulk insert
        let datums = build_datums(session.id, series, mapping);
        let inserted = if datums.is_empty() {
            Ok(0)
        } else {
            self.datums.insert_many(datums).await
        };

        // 3. CSV export, best effort
        let csv_path = match self.exporter.export(&session, series, mapping) {
            Ok(path) => {
                self.metrics.inc_exports_written();
                Some(path)
            }
            Err(e) => {
                self.metrics.inc_export_failures();
                let err = ContractError::from(e);
                error!(error = %err, "CSV export failed");
                None
            }
        };

        let datums = match inserted {
            Ok(count) => {
                self.metrics.add_datums_written(count as u64);
                count
            }
            Err(e) => {
                self.metrics.inc_insert_failures();
                error!(error = %e, "Datum insert failed, session stays open");
                return Err(store_failure("insert_many", e));
            }
        };

        // 4. Close only after the insert succeeded
        let end_time = session.end_time_for(max_observed_tick);
        let session = self
            .sessions
            .close_session(session.id, end_time, csv_path.clone())
            .await
            .map_err(|e| store_failure("close_session", e))?;

        info!(
            datums,
            end_time,
            exported = csv_path.is_some(),
            "Session persisted"
        );

        Ok(SinkReport {
            session,
            datums,
            csv_path,
        })
    }

    /// Close a session that never received data (`end_time == start_time`)
    ///
    /// # Errors
    /// `SessionPersistenceFailure` when the store rejects the close.
    #[instrument(name = "persistence_sink_close_empty", skip(self, session), fields(session_id = %session.id))]
    pub async fn close_empty(&self, session: &Session) -> Result<Session, ContractError> {
        let session = self.current(session).await?;
        self.sessions
            .close_session(session.id, session.end_time_for(0), None)
            .await
            .map_err(|e| store_failure("close_session", e))
    }

    async fn current(&self, session: &Session) -> Result<Session, ContractError> {
        match self.sessions.find_by_id(session.id).await {
            Ok(Some(current)) => Ok(current),
            Ok(None) => Err(ContractError::persistence(
                "find_by_id",
                format!("session {} no longer exists", session.id),
            )),
            Err(e) => {
                warn!(error = %e, "Session re-read failed");
                Err(store_failure("find_by_id", e))
            }
        }
    }
}
