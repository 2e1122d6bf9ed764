//! # Contracts
//!
//! Shared data model and collaborator interfaces for the telemetry syncer.
//! Every other crate depends on this one; it depends on none of them.
//!
//! ## Time Model
//! - `tick` is the device-relative integer clock carried in the `ts` field
//! - Session start/end times are wall-clock epoch milliseconds
//! - `end_time = start_time + max observed tick`

mod config;
mod error;
mod ids;
mod sensor;
mod session;
mod store;
mod telemetry;

pub use config::*;
pub use error::*;
pub use ids::{ChannelKey, DeviceId};
pub use sensor::{Datum, SensorInfo};
pub use session::{NewSession, Session, SessionStatus};
pub use store::{DatumStore, SensorRegistry, SessionStore};
pub use telemetry::{ChannelValues, DenseRow, DenseSeries, RawSample};
