//! 会话指标收集模块
//!
//! 监听器与会话控制器上报的 Prometheus 计数器/仪表，
//! 以及用于运行结束汇总的内存聚合器。

use std::collections::BTreeMap;

use metrics::{counter, gauge, histogram};

/// A controller was started for a new session
pub fn record_session_started() {
    counter!("telemetry_syncer_sessions_started_total").increment(1);
}

/// A controller finished
///
/// `outcome` is one of `completed`, `empty`, `failed`.
pub fn record_session_finished(outcome: &str, samples: usize, rows: usize, datums: usize) {
    counter!(
        "telemetry_syncer_sessions_finished_total",
        "outcome" => outcome.to_string()
    )
    .increment(1);

    histogram!("telemetry_syncer_session_samples").record(samples as f64);
    histogram!("telemetry_syncer_session_rows").record(rows as f64);
    if datums > 0 {
        counter!("telemetry_syncer_datums_persisted_total").increment(datums as u64);
    }
}

/// A connect event did not produce a session
pub fn record_session_rejected(reason: &str) {
    counter!(
        "telemetry_syncer_sessions_rejected_total",
        "reason" => reason.to_string()
    )
    .increment(1);
}

/// Sessions currently buffering telemetry
pub fn record_active_sessions(count: usize) {
    gauge!("telemetry_syncer_active_sessions").set(count as f64);
}

/// One data message appended to a session buffer
pub fn record_sample_buffered() {
    counter!("telemetry_syncer_samples_buffered_total").increment(1);
}

/// A broker message that was skipped
pub fn record_message_dropped(topic_kind: &str, reason: &str) {
    counter!(
        "telemetry_syncer_messages_dropped_total",
        "topic" => topic_kind.to_string(),
        "reason" => reason.to_string()
    )
    .increment(1);
}

/// Channel keys with no registered sensor
pub fn record_unresolved_channels(count: usize) {
    if count > 0 {
        counter!("telemetry_syncer_unresolved_channels_total").increment(count as u64);
    }
}

/// Arrivals whose tick was lower than an earlier arrival's
pub fn record_out_of_order(count: usize) {
    if count > 0 {
        counter!("telemetry_syncer_samples_out_of_order_total").increment(count as u64);
    }
}

/// A CSV export could not be written
pub fn record_export_failure() {
    counter!("telemetry_syncer_export_failures_total").increment(1);
}

/// Per-run aggregation of finished sessions
#[derive(Debug, Clone, Default)]
pub struct SessionMetricsAggregator {
    /// Finished sessions
    pub total_sessions: u64,

    /// Finished sessions by outcome label
    pub outcomes: BTreeMap<String, u64>,

    /// Samples across all sessions
    pub total_samples: u64,

    /// Datums across all sessions
    pub total_datums: u64,

    /// Dense rows per session
    pub rows_stats: RunningStats,
}

impl SessionMetricsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one finished session in
    pub fn update(&mut self, outcome: &str, samples: usize, rows: usize, datums: usize) {
        self.total_sessions += 1;
        *self.outcomes.entry(outcome.to_string()).or_insert(0) += 1;
        self.total_samples += samples as u64;
        self.total_datums += datums as u64;
        self.rows_stats.push(rows as f64);
    }

    pub fn summary(&self) -> MetricsSummary {
        let failed = self.outcomes.get("failed").copied().unwrap_or(0);
        MetricsSummary {
            total_sessions: self.total_sessions,
            outcomes: self.outcomes.clone(),
            total_samples: self.total_samples,
            total_datums: self.total_datums,
            failure_rate: if self.total_sessions > 0 {
                failed as f64 / self.total_sessions as f64 * 100.0
            } else {
                0.0
            },
            rows_per_session: StatsSummary::from(&self.rows_stats),
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Aggregated run summary
#[derive(Debug, Clone, Default)]
pub struct MetricsSummary {
    pub total_sessions: u64,
    pub outcomes: BTreeMap<String, u64>,
    pub total_samples: u64,
    pub total_datums: u64,
    pub failure_rate: f64,
    pub rows_per_session: StatsSummary,
}

impl std::fmt::Display for MetricsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Session Summary ===")?;
        writeln!(f, "Sessions: {}", self.total_sessions)?;
        for (outcome, count) in &self.outcomes {
            writeln!(f, "  {}: {}", outcome, count)?;
        }
        writeln!(f, "Failure rate: {:.2}%", self.failure_rate)?;
        writeln!(f, "Samples: {}", self.total_samples)?;
        writeln!(f, "Datums: {}", self.total_datums)?;
        writeln!(f, "Rows per session: {}", self.rows_per_session)?;
        Ok(())
    }
}

/// min/max/mean/std of a running statistic
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.0}, max={:.0}, mean={:.1}, std={:.1} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// Online mean/variance (Welford)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            let delta2 = value - self.mean;
            self.m2 += delta * delta2;
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// Sample variance
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}
