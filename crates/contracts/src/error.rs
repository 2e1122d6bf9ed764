//! Layered error definitions
//!
//! Categorized by source: config / message / session / reconstruction / export

use thiserror::Error;

/// Unified error type
#[derive(Debug, Error)]
pub enum ContractError {
    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    // ===== Message Errors =====
    /// Broker payload could not be decoded
    #[error("malformed message on '{topic}': {message}")]
    ControlMessageMalformed { topic: String, message: String },

    /// Connect event carried an unusable device identifier
    #[error("invalid device identifier '{raw}'")]
    DeviceIdentifierInvalid { raw: String },

    // ===== Session Errors =====
    /// Session, registry or datum store operation failed
    #[error("session persistence failure during {operation}: {message}")]
    SessionPersistenceFailure { operation: String, message: String },

    /// A session is already active for the device
    #[error("device {device_id} already has an active session")]
    DuplicateSession { device_id: String },

    /// Active session limit reached
    #[error("active session limit reached ({limit})")]
    CapacityExceeded { limit: usize },

    /// Subscription ended before a disconnect arrived
    #[error("subscription '{topic}' closed before disconnect")]
    SubscriptionClosed { topic: String },

    // ===== Reconstruction Errors =====
    /// Disconnect arrived with nothing buffered
    #[error("reconstruction input is empty")]
    ReconstructionInputEmpty,

    /// Channel key has no registered sensor
    #[error("no sensor registered for channel {key} on device {device_id}")]
    RegistryLookupFailure { device_id: String, key: u32 },

    // ===== Export Errors =====
    /// CSV export could not be written
    #[error("export write error for '{path}': {message}")]
    ExportWriteFailure { path: String, message: String },

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl ContractError {
    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create malformed message error
    pub fn malformed(topic: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ControlMessageMalformed {
            topic: topic.into(),
            message: message.into(),
        }
    }

    /// Create store failure error
    pub fn persistence(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SessionPersistenceFailure {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create export failure error
    pub fn export_write(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ExportWriteFailure {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Short machine-friendly label, used as a metrics dimension
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ConfigParse { .. } => "config_parse",
            Self::ConfigValidation { .. } => "config_validation",
            Self::ControlMessageMalformed { .. } => "control_message_malformed",
            Self::DeviceIdentifierInvalid { .. } => "device_identifier_invalid",
            Self::SessionPersistenceFailure { .. } => "session_persistence_failure",
            Self::DuplicateSession { .. } => "duplicate_session",
            Self::CapacityExceeded { .. } => "capacity_exceeded",
            Self::SubscriptionClosed { .. } => "subscription_closed",
            Self::ReconstructionInputEmpty => "reconstruction_input_empty",
            Self::RegistryLookupFailure { .. } => "registry_lookup_failure",
            Self::ExportWriteFailure { .. } => "export_write_failure",
            Self::Io(_) => "io",
            Self::Other(_) => "other",
        }
    }
}
