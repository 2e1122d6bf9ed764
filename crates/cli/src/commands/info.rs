//! `info` command implementation.

use anyhow::{Context, Result};
use contracts::ServiceConfig;
use serde::Serialize;
use tracing::info;

use crate::cli::InfoArgs;
use crate::error::ensure_config_exists;

/// Configuration info for JSON output
#[derive(Serialize)]
struct ConfigInfo {
    version: String,
    broker: BrokerInfo,
    export_root: String,
    supervision: SupervisionInfo,
    devices: Vec<DeviceInfo>,
}

#[derive(Serialize)]
struct BrokerInfo {
    connectivity_topic: String,
    telemetry_topic_prefix: String,
    channel_capacity: usize,
}

#[derive(Serialize)]
struct SupervisionInfo {
    reject_duplicate_connect: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_active_sessions: Option<usize>,
    max_session_ticks: u64,
}

#[derive(Serialize)]
struct DeviceInfo {
    id: String,
    name: String,
    telemetry_topic: String,
    sensor_count: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    sensors: Vec<SensorInfo>,
}

#[derive(Serialize)]
struct SensorInfo {
    sensor_id: String,
    name: String,
    compact_key: u32,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration info");

    ensure_config_exists(&args.config)?;

    let config = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    if args.json {
        let info = build_config_info(&config, args);
        let json =
            serde_json::to_string_pretty(&info).context("Failed to serialize config info")?;
        println!("{}", json);
    } else {
        print_config_info(&config, args);
    }

    Ok(())
}

fn build_config_info(config: &ServiceConfig, args: &InfoArgs) -> ConfigInfo {
    let devices = config
        .devices
        .iter()
        .map(|device| DeviceInfo {
            id: device.id.to_string(),
            name: device.name.clone(),
            telemetry_topic: config.broker.telemetry_topic(&device.id),
            sensor_count: device.sensors.len(),
            sensors: if args.sensors {
                device
                    .sensors
                    .iter()
                    .map(|s| SensorInfo {
                        sensor_id: s.sensor_id.to_string(),
                        name: s.name.clone(),
                        compact_key: s.compact_key.get(),
                    })
                    .collect()
            } else {
                Vec::new()
            },
        })
        .collect();

    ConfigInfo {
        version: format!("{:?}", config.version),
        broker: BrokerInfo {
            connectivity_topic: config.broker.connectivity_topic.clone(),
            telemetry_topic_prefix: config.broker.telemetry_topic_prefix.clone(),
            channel_capacity: config.broker.channel_capacity,
        },
        export_root: config.export.root.display().to_string(),
        supervision: SupervisionInfo {
            reject_duplicate_connect: config.supervision.reject_duplicate_connect,
            max_active_sessions: config.supervision.max_active_sessions,
            max_session_ticks: config.supervision.max_session_ticks,
        },
        devices,
    }
}

fn print_config_info(config: &ServiceConfig, args: &InfoArgs) {
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║              Telemetry Syncer Configuration                  ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");

    println!("📡 Broker");
    println!("   ├─ Version: {:?}", config.version);
    println!(
        "   ├─ Connectivity topic: {}",
        config.broker.connectivity_topic
    );
    println!(
        "   ├─ Telemetry topics: {}<device_id>",
        config.broker.telemetry_topic_prefix
    );
    println!("   └─ Channel capacity: {}", config.broker.channel_capacity);

    println!("\n💾 Export");
    println!(
        "   └─ {}/<device_id>/<session_name>.csv",
        config.export.root.display()
    );

    println!("\n⚙️  Supervision");
    println!(
        "   ├─ Reject duplicate connect: {}",
        config.supervision.reject_duplicate_connect
    );
    match config.supervision.max_active_sessions {
        Some(limit) => println!("   ├─ Max active sessions: {}", limit),
        None => println!("   ├─ Max active sessions: unbounded"),
    }
    println!(
        "   └─ Max session ticks: {}",
        config.supervision.max_session_ticks
    );

    println!("\n🔌 Devices ({})", config.devices.len());
    for (i, device) in config.devices.iter().enumerate() {
        let is_last = i == config.devices.len() - 1;
        let prefix = if is_last { "└─" } else { "├─" };
        let child_prefix = if is_last { "   " } else { "│  " };

        let label = if device.name.is_empty() {
            device.id.to_string()
        } else {
            format!("{} ({})", device.name, device.id)
        };
        println!("   {} {}", prefix, label);

        if args.sensors && !device.sensors.is_empty() {
            println!("   {}  📟 Sensors ({}):", child_prefix, device.sensors.len());
            for (j, sensor) in device.sensors.iter().enumerate() {
                let sensor_is_last = j == device.sensors.len() - 1;
                let sensor_prefix = if sensor_is_last { "└─" } else { "├─" };
                println!(
                    "   {}     {} {} (key {}, {})",
                    child_prefix, sensor_prefix, sensor.name, sensor.compact_key, sensor.sensor_id
                );
            }
        } else {
            println!("   {}  └─ {} sensors", child_prefix, device.sensors.len());
        }
    }

    println!();
}
