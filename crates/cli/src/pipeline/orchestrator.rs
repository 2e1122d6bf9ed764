//! Pipeline orchestrator - wires the listener, the stores and the bus.
//!
//! The in-process bus stands in for the broker. Events come from a replay
//! file (or stdin); without one the listener runs until shutdown.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use contracts::ServiceConfig;
use ingestion::MessageBus;
use observability::SessionMetricsAggregator;
use persistence::{CsvExporter, MemoryStore, PersistenceMetrics};
use session::{ActiveSessions, ConnectionListener, SessionReport, SessionServices};
use tokio::sync::mpsc;
use tracing::{info, warn};

use super::{PipelineStats, ReplaySource, ReplayStats, Replayer};
use crate::error::CliError;

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Loaded service configuration
    pub service: ServiceConfig,

    /// Events to replay (None = listen until shutdown)
    pub input: Option<ReplaySource>,

    /// Wait bound for controller subscription and for open sessions at the end
    pub settle_timeout: Duration,

    /// Metrics server port (None = disabled)
    pub metrics_port: Option<u16>,
}

/// Main pipeline orchestrator
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Run until the replay is done or `shutdown` resolves.
    ///
    /// Sessions still open when the bus shuts down are marked failed by
    /// their controllers and appear in the returned stats.
    pub async fn run<F>(self, shutdown: F) -> Result<PipelineStats>
    where
        F: Future<Output = ()>,
    {
        let start_time = Instant::now();
        let service = &self.config.service;

        // 1. Metrics endpoint
        if let Some(port) = self.config.metrics_port {
            observability::init_metrics_only(port)?;
            info!("Metrics endpoint available on port {}", port);
        }

        // 2. Stores, seeded from the device registry in config
        let store = Arc::new(MemoryStore::from_config(service));
        let persistence_metrics = Arc::new(PersistenceMetrics::new());
        let services = SessionServices::shared(
            Arc::clone(&store),
            CsvExporter::new(&service.export.root),
        )
        .with_metrics(Arc::clone(&persistence_metrics));

        // 3. Bus + listener + report collector
        let bus = MessageBus::new(service.broker.channel_capacity);
        let (report_tx, report_rx) = mpsc::unbounded_channel();

        let listener = ConnectionListener::new(bus.clone(), service, services).with_reports(report_tx);
        let active = listener.active_sessions();
        let listener_handle = listener
            .spawn()
            .await
            .map_err(|e| CliError::listener_start(e.to_string()))?;
        let collector = tokio::spawn(collect_reports(report_rx));

        info!(
            topic = %service.broker.connectivity_topic,
            export_root = %service.export.root.display(),
            "Listener started"
        );

        // 4. Replay or wait for shutdown
        tokio::pin!(shutdown);
        let replay = match &self.config.input {
            Some(source) => {
                let replayer = Replayer::new(
                    bus.clone(),
                    service.broker.clone(),
                    self.config.settle_timeout,
                );
                tokio::select! {
                    result = replayer.replay_source(source) => {
                        let stats = result?;
                        self.wait_for_sessions(&active).await;
                        stats
                    }
                    _ = &mut shutdown => {
                        warn!("Received shutdown signal during replay");
                        ReplayStats::default()
                    }
                }
            }
            None => {
                info!("No input given, listening until shutdown");
                shutdown.await;
                ReplayStats::default()
            }
        };

        // 5. Drain: open sessions fail, listener returns its stats
        bus.shutdown();
        let listener_stats = listener_handle
            .await
            .context("Listener task panicked")?;
        let (reports, session_metrics) = collector.await.context("Report collector panicked")?;

        Ok(PipelineStats {
            duration: start_time.elapsed(),
            replay,
            listener: listener_stats,
            reports,
            session_metrics,
            persistence: persistence_metrics.snapshot(),
            bus: bus.metrics().snapshot(),
        })
    }

    /// Give open sessions up to the settle timeout to disconnect
    async fn wait_for_sessions(&self, active: &ActiveSessions) {
        if !active.wait_idle(self.config.settle_timeout).await {
            warn!(
                open = active.len(),
                "Sessions still open at shutdown will be marked failed"
            );
        }
    }
}

async fn collect_reports(
    mut rx: mpsc::UnboundedReceiver<SessionReport>,
) -> (Vec<SessionReport>, SessionMetricsAggregator) {
    let mut reports = Vec::new();
    let mut aggregator = SessionMetricsAggregator::new();

    while let Some(report) = rx.recv().await {
        aggregator.update(
            report.outcome.as_str(),
            report.samples,
            report.rows,
            report.datums,
        );
        reports.push(report);
    }

    (reports, aggregator)
}
