//! Afterburner exporter
//!
//! Ingests the rotating hardware monitoring log written by MSI Afterburner
//! and exports its readings to InfluxDB, MQTT and JSONL sinks.

pub mod config;
pub mod exporter;
pub mod pipeline;

pub use config::{ConfigError, ExporterConfig};
pub use exporter::{MetricSink, SinkError};
pub use pipeline::{Pipeline, ReferenceZone};
