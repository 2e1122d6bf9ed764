//! # Session
//!
//! Connection listener, per-device session controllers and admission
//! control.
//!
//! ```text
//! connectivity topic ──► ConnectionListener ──spawn──► SessionController (one per device)
//!                               │                             │ disconnect
//!                         ActiveSessions                      ▼
//!                                                  SessionServices::finalize
//!                                         reconstruct → resolve → persist / close
//! ```
//!
//! ## Usage Example
//!
//! ```ignore
//! let store = Arc::new(MemoryStore::from_config(&config));
//! let services = SessionServices::shared(store, CsvExporter::new(&config.export.root));
//! let (tx, mut reports) = tokio::sync::mpsc::unbounded_channel();
//!
//! let handle = ConnectionListener::new(bus.clone(), &config, services)
//!     .with_reports(tx)
//!     .spawn()
//!     .await?;
//! ```

mod controller;
mod error;
mod listener;
mod services;
mod supervisor;

pub use controller::SessionController;
pub use error::{Result, SessionError};
pub use listener::{ConnectionListener, ListenerStats};
pub use services::{SessionOutcome, SessionReport, SessionServices};
pub use supervisor::{ActiveSessions, SessionSlot};
