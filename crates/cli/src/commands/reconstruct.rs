//! `reconstruct` command implementation.
//!
//! Offline: reads one device capture (telemetry payloads, one per line, in
//! arrival order), reconstructs it and writes the CSV with raw channel keys
//! as column names. Nothing is stored.

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use contracts::RawSample;
use ingestion::{decode_telemetry, TelemetryMessage};
use persistence::{render_csv, ChannelMapping};
use reconstructor::reconstruct_bounded;
use tracing::{info, warn};

use crate::cli::ReconstructArgs;
use crate::error::CliError;

/// Execute the `reconstruct` command
pub fn run_reconstruct(args: &ReconstructArgs) -> Result<()> {
    info!(input = %args.input.display(), "Reconstructing capture");

    let file = File::open(&args.input).map_err(|e| CliError::input_read(&args.input, e.to_string()))?;
    let samples = read_capture(BufReader::new(file), &args.input)?;

    let output =
        reconstruct_bounded(&samples, args.max_ticks).context("Reconstruction failed")?;
    let mapping = ChannelMapping::raw_only(output.series.channel_keys());

    info!(
        samples = output.stats.samples,
        rows = output.stats.rows,
        channels = output.stats.channels,
        dropped = output.stats.dropped,
        "Capture reconstructed"
    );

    match &args.output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create {}", path.display()))?;
            let mut out = BufWriter::new(file);
            render_csv(&mut out, &output.series, &mapping)?;
            out.flush()?;
            info!(output = %path.display(), "CSV written");
        }
        None => {
            let stdout = io::stdout();
            let mut out = stdout.lock();
            render_csv(&mut out, &output.series, &mapping)?;
            out.flush()?;
        }
    }

    Ok(())
}

/// Data samples of a capture, in line order.
///
/// Control messages end the capture at the first disconnect; malformed lines
/// are skipped.
fn read_capture<R: BufRead>(reader: R, path: &Path) -> Result<Vec<RawSample>, CliError> {
    let topic = path.display().to_string();
    let mut samples = Vec::new();

    for (index, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| CliError::input_read(path, e.to_string()))?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match decode_telemetry(&topic, line.as_bytes()) {
            Ok(TelemetryMessage::Data(sample)) => samples.push(sample),
            Ok(TelemetryMessage::Control { active: false }) => break,
            Ok(TelemetryMessage::Control { active: true }) => {}
            Err(e) => warn!(line = index + 1, error = %e, "Skipping malformed line"),
        }
    }

    Ok(samples)
}
