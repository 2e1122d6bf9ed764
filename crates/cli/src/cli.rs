//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Telemetry Syncer - turns sparse device telemetry into dense, stored sessions
#[derive(Parser, Debug)]
#[command(
    name = "telemetry-syncer",
    author,
    version,
    about = "Device telemetry session syncer",
    long_about = "Listens for device connect events, buffers each device's telemetry until it \n\
                  disconnects, reconstructs a dense tick-indexed series, stores one datum per \n\
                  sensor and tick, and exports the session as CSV."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "TELEMETRY_SYNCER_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        global = true,
        env = "TELEMETRY_SYNCER_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the listener on an in-process bus, optionally replaying recorded events
    Run(RunArgs),

    /// Validate configuration file without running
    Validate(ValidateArgs),

    /// Display configuration information
    Info(InfoArgs),

    /// Reconstruct one recorded device capture to CSV, offline
    Reconstruct(ReconstructArgs),
}

/// Arguments for the `run` command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Path to configuration file (TOML or JSON)
    #[arg(
        short,
        long,
        default_value = "config.toml",
        env = "TELEMETRY_SYNCER_CONFIG"
    )]
    pub config: PathBuf,

    /// Override the CSV export root from configuration
    #[arg(long, env = "TELEMETRY_SYNCER_EXPORT_ROOT")]
    pub export_root: Option<PathBuf>,

    /// JSON-lines broker events to replay (`-` for stdin); without it the
    /// listener runs until Ctrl+C
    #[arg(short, long, env = "TELEMETRY_SYNCER_INPUT")]
    pub input: Option<PathBuf>,

    /// Seconds to wait for a controller to subscribe after a replayed connect,
    /// and for open sessions to finish after the replay ends
    #[arg(long, default_value = "5", env = "TELEMETRY_SYNCER_SETTLE_TIMEOUT")]
    pub settle_timeout: u64,

    /// Validate configuration and exit without running
    #[arg(long)]
    pub dry_run: bool,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "0", env = "TELEMETRY_SYNCER_METRICS_PORT")]
    pub metrics_port: u16,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Show every registered sensor
    #[arg(long)]
    pub sensors: bool,
}

/// Arguments for the `reconstruct` command
#[derive(Parser, Debug)]
pub struct ReconstructArgs {
    /// JSON-lines file of telemetry payloads in arrival order
    #[arg(short, long)]
    pub input: PathBuf,

    /// CSV output path (stdout when omitted)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Refuse captures whose last tick is past this value
    #[arg(long, default_value_t = contracts::DEFAULT_MAX_SESSION_TICKS)]
    pub max_ticks: u64,
}

/// Log output format
#[derive(ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
}
