//! Pipeline statistics.

use std::time::Duration;

use ingestion::BusMetricsSnapshot;
use observability::SessionMetricsAggregator;
use persistence::PersistenceMetricsSnapshot;
use session::{ListenerStats, SessionOutcome, SessionReport};

use super::ReplayStats;

/// Statistics from a pipeline run
#[derive(Debug, Clone)]
pub struct PipelineStats {
    /// Total duration of the run
    pub duration: Duration,

    pub replay: ReplayStats,

    pub listener: ListenerStats,

    /// One report per finished session, in completion order
    pub reports: Vec<SessionReport>,

    pub session_metrics: SessionMetricsAggregator,

    pub persistence: PersistenceMetricsSnapshot,

    pub bus: BusMetricsSnapshot,
}

impl PipelineStats {
    /// Sessions that ended with the given outcome
    pub fn count(&self, outcome: SessionOutcome) -> usize {
        self.reports.iter().filter(|r| r.outcome == outcome).count()
    }

    /// Print detailed summary
    pub fn print_summary(&self) {
        println!("\n╔══════════════════════════════════════════════════════════════╗");
        println!("║                    Pipeline Statistics                       ║");
        println!("╚══════════════════════════════════════════════════════════════╝\n");

        println!("📊 Overview");
        println!("   ├─ Duration: {:.2}s", self.duration.as_secs_f64());
        println!("   ├─ Events replayed: {}", self.replay.published);
        println!("   ├─ Lines skipped: {}", self.replay.skipped);
        println!("   ├─ Connectivity events: {}", self.listener.events);
        println!("   ├─ Sessions started: {}", self.listener.sessions_started);
        println!("   ├─ Connects rejected: {}", self.listener.rejected);
        println!("   ├─ Controllers aborted: {}", self.listener.aborted);
        println!("   └─ Malformed events: {}", self.listener.malformed);

        let summary = self.session_metrics.summary();
        println!("\n📈 Sessions");
        println!("   ├─ Completed: {}", self.count(SessionOutcome::Completed));
        println!("   ├─ Empty: {}", self.count(SessionOutcome::Empty));
        println!(
            "   ├─ Failed: {} ({:.2}%)",
            self.count(SessionOutcome::Failed),
            summary.failure_rate
        );
        println!("   ├─ Samples: {}", summary.total_samples);
        println!("   └─ Rows per session: {}", summary.rows_per_session);

        println!("\n💾 Persistence");
        println!("   ├─ Datums written: {}", self.persistence.datums_written);
        println!("   ├─ Insert failures: {}", self.persistence.insert_failures);
        println!("   ├─ CSV files: {}", self.persistence.exports_written);
        println!("   ├─ CSV failures: {}", self.persistence.export_failures);
        println!(
            "   └─ Unresolved channels: {}",
            self.persistence.unresolved_channels
        );

        println!("\n🚌 Bus");
        println!("   ├─ Published: {}", self.bus.published);
        println!("   ├─ Delivered: {}", self.bus.delivered);
        println!("   └─ Unrouted: {}", self.bus.unrouted);

        let failed: Vec<_> = self
            .reports
            .iter()
            .filter(|r| r.outcome == SessionOutcome::Failed)
            .collect();
        if !failed.is_empty() {
            println!("\n⚠️  Failed Sessions");
            for report in failed {
                println!(
                    "   ├─ {} ({}): {}",
                    report.session_id,
                    report.device_id,
                    report.error.as_deref().unwrap_or("unknown")
                );
            }
        }

        println!();
    }
}
