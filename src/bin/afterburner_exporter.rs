//! Afterburner Exporter runtime
//!
//! Polls the monitoring log on a fixed interval and exports every reading to
//! the configured sinks until CTRL+C.
//!
//! Usage:
//!   cargo run --release --bin afterburner_exporter
//!
//! Environment variables (or a `.env` file):
//!   AFTERBURNER_LOG_PATH - Monitoring log to ingest (required)
//!   POLL_INTERVAL_MS - Interval between passes (default: 15000)
//!   REFERENCE_TIMEZONE - Zone of the log timestamps (default: Europe/London)
//!   LOCK_FAILURE_POLICY - skip | escalate (default: skip)
//!   INFLUXDB_URL / INFLUXDB_ORG / INFLUXDB_BUCKET / INFLUXDB_TOKEN - InfluxDB sink
//!   MQTT_BROKER / MQTT_PORT / MQTT_TOPIC - MQTT sink
//!   JSONL_OUTPUT_PATH - JSONL sink

use afterburner_exporter::config::ExporterConfig;
use afterburner_exporter::exporter::build_sinks;
use afterburner_exporter::pipeline::{scheduler, Pipeline, ReferenceZone};
use dotenv::dotenv;
use log::{error, info, warn};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize environment and logging
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    info!("🚀 Starting Afterburner Exporter");

    let config = ExporterConfig::from_env()?;

    info!("📊 Configuration:");
    info!("   ├─ Log file: {}", config.log_path.display());
    info!("   ├─ Interval: {}ms", config.poll_interval_ms);
    info!("   ├─ Time zone: {}", config.reference_timezone);
    info!("   ├─ Lock failure policy: {:?}", config.lock_failure_policy);
    match &config.influxdb {
        Some(influx) => info!("   ├─ InfluxDB: {} (org: {}, bucket: {})", influx.url, influx.org, influx.bucket),
        None => info!("   ├─ InfluxDB: disabled"),
    }
    match &config.mqtt {
        Some(mqtt) => info!("   ├─ MQTT: {}:{} (topic: {})", mqtt.broker, mqtt.port, mqtt.topic),
        None => info!("   ├─ MQTT: disabled"),
    }
    match &config.jsonl_path {
        Some(path) => info!("   └─ JSONL: {}", path.display()),
        None => info!("   └─ JSONL: disabled"),
    }

    let sinks = build_sinks(&config)?;
    if sinks.is_empty() {
        warn!("⚠️  No sinks configured; log files will be consumed and discarded");
    }

    let zone = ReferenceZone::resolve(&config.reference_timezone);
    let pipeline = Arc::new(Pipeline::new(config.log_path.clone(), zone, sinks));

    let handle = scheduler::spawn(
        pipeline,
        Duration::from_millis(config.poll_interval_ms),
        config.lock_failure_policy,
    );

    info!("🔄 Press CTRL+C to shutdown gracefully");

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            match signal {
                Ok(()) => info!("⚠️  Received CTRL+C, shutting down..."),
                Err(err) => error!("❌ Failed to listen for CTRL+C: {}", err),
            }
        }
        // Only reachable under the escalate policy
        _ = handle.stopped() => {}
    }

    if let Err(e) = handle.shutdown().await {
        error!("❌ {}", e);
        return Err(e.into());
    }

    info!("✅ Afterburner Exporter stopped");
    Ok(())
}
