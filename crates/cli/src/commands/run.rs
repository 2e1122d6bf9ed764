//! `run` command implementation.

use anyhow::{Context, Result};
use contracts::ServiceConfig;
use std::time::Duration;
use tracing::{info, warn};

use crate::cli::RunArgs;
use crate::error::ensure_config_exists;
use crate::pipeline::{Pipeline, PipelineConfig, ReplaySource};

/// Execute the `run` command
pub async fn run_pipeline(args: &RunArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration");

    ensure_config_exists(&args.config)?;

    let mut config = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    if let Some(ref root) = args.export_root {
        info!(export_root = %root.display(), "Overriding export root from CLI");
        config.export.root = root.clone();
    }

    info!(
        connectivity_topic = %config.broker.connectivity_topic,
        export_root = %config.export.root.display(),
        devices = config.devices.len(),
        "Configuration loaded"
    );

    if args.dry_run {
        info!("Dry run mode - configuration is valid, exiting");
        print_config_summary(&config);
        return Ok(());
    }

    let pipeline = Pipeline::new(PipelineConfig {
        service: config,
        input: args.input.as_deref().map(ReplaySource::from_arg),
        settle_timeout: Duration::from_secs(args.settle_timeout),
        metrics_port: if args.metrics_port == 0 {
            None
        } else {
            Some(args.metrics_port)
        },
    });

    info!("Starting pipeline...");

    let stats = pipeline
        .run(shutdown_signal())
        .await
        .context("Pipeline execution failed")?;

    info!(
        sessions = stats.reports.len(),
        datums = stats.persistence.datums_written,
        duration_secs = stats.duration.as_secs_f64(),
        "Pipeline completed"
    );
    stats.print_summary();

    info!("Telemetry Syncer finished");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM.
///
/// A handler that cannot be installed never resolves; the other one still can.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    warn!("Received shutdown signal, stopping pipeline...");
}

/// Print configuration summary for dry-run mode
fn print_config_summary(config: &ServiceConfig) {
    println!("\n=== Configuration Summary ===\n");
    println!("Broker:");
    println!("  Connectivity topic: {}", config.broker.connectivity_topic);
    println!(
        "  Telemetry topics: {}<device_id>",
        config.broker.telemetry_topic_prefix
    );
    println!("\nExport root: {}", config.export.root.display());

    println!("\nDevices ({}):", config.devices.len());
    for device in &config.devices {
        println!(
            "  - {} ({}) - {} sensors",
            device.id,
            if device.name.is_empty() { "unnamed" } else { &device.name },
            device.sensors.len()
        );
    }

    println!();
}
