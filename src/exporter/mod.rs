//! Export backends
//!
//! Every backend implements [`MetricSink`]: samples are added to a private
//! batch and delivered on `flush`.
//!
//! ```text
//! SinkDispatch → InfluxDbSink → POST /api/v2/write (Line Protocol)
//!              → MqttSink     → publish per-field summaries (JSON)
//!              → JsonlSink    → append to local file
//! ```

pub mod backend;
pub mod batch;
pub mod influx;
pub mod jsonl;
pub mod mqtt;

pub use backend::{MetricSink, SinkError};
pub use batch::Batch;
pub use influx::InfluxDbSink;
pub use jsonl::JsonlSink;
pub use mqtt::MqttSink;

use crate::config::ExporterConfig;
use std::sync::Arc;

/// Build every sink enabled in the configuration.
///
/// Registration order is InfluxDB, MQTT, JSONL. The MQTT sink spawns its
/// event loop, so this must run inside a tokio runtime.
pub fn build_sinks(config: &ExporterConfig) -> Result<Vec<Arc<dyn MetricSink>>, SinkError> {
    let mut sinks: Vec<Arc<dyn MetricSink>> = Vec::new();

    if let Some(influx) = &config.influxdb {
        sinks.push(Arc::new(InfluxDbSink::new(influx)?));
    }
    if let Some(mqtt) = &config.mqtt {
        sinks.push(Arc::new(MqttSink::connect(mqtt)));
    }
    if let Some(path) = &config.jsonl_path {
        sinks.push(Arc::new(JsonlSink::new(path)?));
    }

    Ok(sinks)
}
