//! Replay - 从 JSONL 文件回放 broker 事件
//!
//! 每行一个事件：`{"topic": "...", "payload": {...}}`。
//! 空行忽略，无法解析的行记录警告后跳过。

use std::path::{Path, PathBuf};
use std::time::Duration;

use contracts::BrokerConfig;
use ingestion::{decode_connectivity, MessageBus};
use serde::Deserialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};

use crate::error::CliError;

/// One recorded broker message
#[derive(Debug, Deserialize)]
pub struct ReplayEvent {
    pub topic: String,
    pub payload: serde_json::Value,
}

/// Replay counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayStats {
    /// Events published to the bus
    pub published: u64,
    /// Lines that were not valid replay events
    pub skipped: u64,
    /// Published events no subscriber received
    pub undelivered: u64,
}

/// Where replay events come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplaySource {
    Stdin,
    File(PathBuf),
}

impl ReplaySource {
    /// `-` means stdin
    pub fn from_arg(path: &Path) -> Self {
        if path == Path::new("-") {
            Self::Stdin
        } else {
            Self::File(path.to_path_buf())
        }
    }
}

impl std::fmt::Display for ReplaySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stdin => f.write_str("<stdin>"),
            Self::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Publishes recorded events onto a bus in file order
pub struct Replayer {
    bus: MessageBus,
    broker: BrokerConfig,
    settle: Duration,
}

impl Replayer {
    pub fn new(bus: MessageBus, broker: BrokerConfig, settle: Duration) -> Self {
        Self {
            bus,
            broker,
            settle,
        }
    }

    pub async fn replay_source(&self, source: &ReplaySource) -> Result<ReplayStats, CliError> {
        info!(source = %source, "Replaying broker events");
        match source {
            ReplaySource::Stdin => self.replay(BufReader::new(tokio::io::stdin())).await,
            ReplaySource::File(path) => {
                let file = tokio::fs::File::open(path)
                    .await
                    .map_err(|e| CliError::input_read(path, e.to_string()))?;
                self.replay(BufReader::new(file)).await
            }
        }
    }

    /// Publish every event read from `reader`.
    ///
    /// After a connect event the replay waits (up to the settle timeout) for
    /// the device's controller to subscribe, so the telemetry that follows is
    /// not published to an empty topic.
    pub async fn replay<R: AsyncBufRead + Unpin>(&self, reader: R) -> Result<ReplayStats, CliError> {
        let mut stats = ReplayStats::default();
        let mut lines = reader.lines();
        let mut line_no = 0usize;

        while let Some(line) = lines.next_line().await? {
            line_no += 1;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let event: ReplayEvent = match serde_json::from_str(line) {
                Ok(event) => event,
                Err(e) => {
                    warn!(line = line_no, error = %e, "Skipping replay line");
                    stats.skipped += 1;
                    continue;
                }
            };

            let payload = event.payload.to_string();
            let delivered = self.bus.publish(&event.topic, payload.clone()).await;
            stats.published += 1;
            if delivered == 0 {
                stats.undelivered += 1;
                debug!(line = line_no, topic = %event.topic, "Replayed event had no subscriber");
            }

            if event.topic == self.broker.connectivity_topic {
                self.await_controller(payload.as_bytes()).await;
            }
        }

        info!(
            published = stats.published,
            skipped = stats.skipped,
            undelivered = stats.undelivered,
            "Replay finished"
        );
        Ok(stats)
    }

    async fn await_controller(&self, payload: &[u8]) {
        let Ok(event) = decode_connectivity(&self.broker.connectivity_topic, payload) else {
            return;
        };
        if !event.active {
            return;
        }
        let Ok(device_id) = event.device_id() else {
            return;
        };

        let topic = self.broker.telemetry_topic(&device_id);
        if !self.bus.wait_for_subscribers(&topic, 1, self.settle).await {
            warn!(device_id = %device_id, "No controller subscribed after connect");
        }
    }
}
