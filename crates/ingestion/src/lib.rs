//! # Ingestion
//!
//! Broker-facing side of the syncer.
//!
//! Responsibilities:
//! - `Broker` abstraction over topic subscriptions
//! - In-process `MessageBus` (topic fan-out over async-channel)
//! - Decode connectivity and telemetry payloads
//!
//! ## Usage Example
//!
//! ```ignore
//! use ingestion::{Broker, MessageBus, decode_telemetry};
//!
//! let bus = MessageBus::new(1024);
//! let sub = bus.subscribe("device-telemetry-<id>").await?;
//! while let Some(payload) = sub.recv().await {
//!     match decode_telemetry(sub.topic(), &payload)? {
//!         TelemetryMessage::Data(sample) => buffer.push(sample),
//!         TelemetryMessage::Control { active: false } => break,
//!         TelemetryMessage::Control { .. } => {}
//!     }
//! }
//! ```

mod broker;
mod bus;
mod error;
mod wire;

pub use broker::{Broker, LocalBroker, Subscription};
pub use bus::{BusMetrics, BusMetricsSnapshot, MessageBus};
pub use error::{IngestionError, Result};
pub use wire::{
    decode_connectivity, decode_telemetry, encode_connectivity, encode_control, encode_data,
    ConnectivityEvent, TelemetryMessage, TICK_FIELD,
};
