//! SessionServices - collaborators shared by every controller
//!
//! Holds the injected stores and runs the disconnect-time pipeline:
//! reconstruct, resolve channels, persist.

use std::path::PathBuf;
use std::sync::Arc;

use contracts::{
    ContractError, DatumStore, DeviceId, RawSample, SensorRegistry, Session, SessionStore,
    DEFAULT_MAX_SESSION_TICKS,
};
use observability::{record_export_failure, record_out_of_order, record_unresolved_channels};
use persistence::{ChannelResolver, CsvExporter, PersistenceMetrics, PersistenceSink};
use reconstructor::{reconstruct_bounded, ReconstructError};
use tracing::{error, info, instrument};
use uuid::Uuid;

/// How a controller ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Datums written, session closed
    Completed,
    /// Disconnect with nothing buffered, session closed with no data
    Empty,
    /// Session marked failed
    Failed,
}

impl SessionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Empty => "empty",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for SessionOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one session, produced by every controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    pub session_id: Uuid,
    pub device_id: DeviceId,
    pub outcome: SessionOutcome,
    /// Buffered data messages
    pub samples: usize,
    /// Dense rows reconstructed
    pub rows: usize,
    /// Datums written
    pub datums: usize,
    pub csv_path: Option<PathBuf>,
    /// Failure cause when `outcome` is `Failed`
    pub error: Option<String>,
}

impl SessionReport {
    fn new(session: &Session, outcome: SessionOutcome, samples: usize) -> Self {
        Self {
            session_id: session.id,
            device_id: session.device_id,
            outcome,
            samples,
            rows: 0,
            datums: 0,
            csv_path: None,
            error: None,
        }
    }

    fn failed(session: &Session, samples: usize, rows: usize, err: &ContractError) -> Self {
        Self {
            rows,
            error: Some(err.to_string()),
            ..Self::new(session, SessionOutcome::Failed, samples)
        }
    }
}

/// Stores and pipeline stages handed to each controller
pub struct SessionServices<S, R, D> {
    sessions: Arc<S>,
    resolver: ChannelResolver<R>,
    sink: PersistenceSink<S, D>,
    max_tick: u64,
}

impl<S, R, D> Clone for SessionServices<S, R, D> {
    fn clone(&self) -> Self {
        Self {
            sessions: Arc::clone(&self.sessions),
            resolver: self.resolver.clone(),
            sink: self.sink.clone(),
            max_tick: self.max_tick,
        }
    }
}

impl<T> SessionServices<T, T, T>
where
    T: SessionStore + SensorRegistry + DatumStore + Sync,
{
    /// One store backing all three collaborator roles
    pub fn shared(store: Arc<T>, exporter: CsvExporter) -> Self {
        Self::new(Arc::clone(&store), Arc::clone(&store), store, exporter)
    }
}

impl<S, R, D> SessionServices<S, R, D>
where
    S: SessionStore + Sync,
    R: SensorRegistry + Sync,
    D: DatumStore + Sync,
{
    pub fn new(sessions: Arc<S>, registry: Arc<R>, datums: Arc<D>, exporter: CsvExporter) -> Self {
        Self {
            sink: PersistenceSink::new(Arc::clone(&sessions), datums, exporter),
            resolver: ChannelResolver::new(registry),
            sessions,
            max_tick: DEFAULT_MAX_SESSION_TICKS,
        }
    }

    /// Largest device tick a session may reconstruct
    pub fn with_tick_limit(mut self, max_tick: u64) -> Self {
        self.max_tick = max_tick;
        self
    }

    pub fn tick_limit(&self) -> u64 {
        self.max_tick
    }

    /// Share persistence counters with the caller
    pub fn with_metrics(mut self, metrics: Arc<PersistenceMetrics>) -> Self {
        self.sink = self.sink.with_metrics(metrics);
        self
    }

    pub fn sessions(&self) -> &Arc<S> {
        &self.sessions
    }

    /// Turn a disconnected session's buffer into stored data.
    ///
    /// Never fails: store errors mark the session failed and are reported.
    #[instrument(
        name = "session_finalize",
        skip(self, session, buffer),
        fields(session_id = %session.id, device_id = %session.device_id, samples = buffer.len())
    )]
    pub async fn finalize(&self, session: &Session, buffer: &[RawSample]) -> SessionReport {
        let samples = buffer.len();

        // 1. Reconstruct (empty buffer closes the session with no data)
        let output = match reconstruct_bounded(buffer, self.max_tick) {
            Ok(output) => output,
            Err(ReconstructError::InputEmpty) => {
                info!("Disconnect with no telemetry buffered");
                return match self.sink.close_empty(session).await {
                    Ok(_) => SessionReport::new(session, SessionOutcome::Empty, 0),
                    Err(e) => self.fail(session, samples, 0, e).await,
                };
            }
            Err(e) => return self.fail(session, samples, 0, e.into()).await,
        };

        let stats = output.stats;
        record_out_of_order(stats.out_of_order);

        // 2. Resolve channel keys to sensors
        let keys = output.series.channel_keys();
        let mapping = match self.resolver.resolve(session.device_id, &keys).await {
            Ok(mapping) => mapping,
            Err(e) => return self.fail(session, samples, stats.rows, e).await,
        };
        record_unresolved_channels(mapping.unresolved.len());

        // 3. Persist and close
        match self
            .sink
            .persist(session, &output.series, &mapping, stats.max_observed_tick)
            .await
        {
            Ok(written) => {
                if written.csv_path.is_none() {
                    record_export_failure();
                }
                SessionReport {
                    rows: stats.rows,
                    datums: written.datums,
                    csv_path: written.csv_path,
                    ..SessionReport::new(session, SessionOutcome::Completed, samples)
                }
            }
            Err(e) => self.fail(session, samples, stats.rows, e).await,
        }
    }

    /// Mark the session failed and build its report
    pub(crate) async fn fail(
        &self,
        session: &Session,
        samples: usize,
        rows: usize,
        err: ContractError,
    ) -> SessionReport {
        error!(session_id = %session.id, error = %err, "Session failed");
        if let Err(mark_err) = self.sessions.mark_failed(session.id).await {
            error!(
                session_id = %session.id,
                error = %mark_err,
                "Could not mark session as failed"
            );
        }
        SessionReport::failed(session, samples, rows, &err)
    }
}
