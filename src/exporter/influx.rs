//! InfluxDB v2 sink.
//!
//! Samples are rendered to Line Protocol when added and written in one
//! request per flush:
//! ```text
//! afterburner,device=GPU1 temp=55.5 1704103200000000000
//! ```
//!
//! See: <https://docs.influxdata.com/influxdb/v2/reference/syntax/line-protocol/>

use super::backend::{MetricSink, SinkError};
use super::batch::Batch;
use crate::config::InfluxDbConfig;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Render one sample as a Line Protocol point.
///
/// The `device` tag is omitted when empty since InfluxDB rejects empty tag
/// values. Returns `None` for timestamps outside the nanosecond range.
pub fn line_protocol_point(
    measurement: &str,
    device: &str,
    field: &str,
    value: f64,
    timestamp: DateTime<Utc>,
) -> Option<String> {
    let timestamp_ns = timestamp.timestamp_nanos_opt()?;

    let mut line = escape_measurement(measurement);
    if !device.is_empty() {
        line.push_str(",device=");
        line.push_str(&escape_key_or_tag(device));
    }
    line.push(' ');
    line.push_str(&escape_key_or_tag(field));
    line.push('=');
    line.push_str(&value.to_string());
    line.push(' ');
    line.push_str(&timestamp_ns.to_string());

    Some(line)
}

/// Spaces and commas must be escaped with backslash.
fn escape_measurement(s: &str) -> String {
    s.replace(',', "\\,").replace(' ', "\\ ")
}

/// Commas, equals signs, and spaces must be escaped.
fn escape_key_or_tag(s: &str) -> String {
    s.replace(',', "\\,")
        .replace('=', "\\=")
        .replace(' ', "\\ ")
}

/// Sink writing batches to the InfluxDB v2 `/api/v2/write` endpoint
pub struct InfluxDbSink {
    client: reqwest::Client,
    write_url: String,
    org: String,
    bucket: String,
    token: String,
    measurement: String,
    pending: Batch<Vec<String>>,
}

impl InfluxDbSink {
    pub fn new(config: &InfluxDbConfig) -> Result<Self, SinkError> {
        let client = reqwest::Client::builder().timeout(WRITE_TIMEOUT).build()?;

        log::info!("✅ InfluxDB sink initialized ({})", config.url);

        Ok(Self {
            client,
            write_url: format!("{}/api/v2/write", config.url.trim_end_matches('/')),
            org: config.org.clone(),
            bucket: config.bucket.clone(),
            token: config.token.clone(),
            measurement: config.measurement.clone(),
            pending: Batch::new(),
        })
    }

    /// Number of points waiting for the next flush
    pub fn pending_len(&self) -> usize {
        self.pending.with(|lines| lines.len())
    }
}

#[async_trait]
impl MetricSink for InfluxDbSink {
    fn add_to_batch(
        &self,
        device: &str,
        field: &str,
        value: f64,
        timestamp: DateTime<Utc>,
    ) -> Result<(), SinkError> {
        let line = line_protocol_point(&self.measurement, device, field, value, timestamp)
            .ok_or_else(|| {
                SinkError::Rejected(format!("timestamp out of range: {}", timestamp))
            })?;
        self.pending.with(|lines| lines.push(line));
        Ok(())
    }

    async fn flush(&self) -> Result<(), SinkError> {
        // The batch is dropped even when the write fails
        let lines = self.pending.take();
        if lines.is_empty() {
            return Ok(());
        }

        let count = lines.len();
        self.client
            .post(&self.write_url)
            .query(&[
                ("org", self.org.as_str()),
                ("bucket", self.bucket.as_str()),
                ("precision", "ns"),
            ])
            .header("Authorization", format!("Token {}", self.token))
            .header("Content-Type", "text/plain; charset=utf-8")
            .body(lines.join("\n"))
            .send()
            .await?
            .error_for_status()?;

        log::debug!("✅ Wrote {} points to InfluxDB", count);
        Ok(())
    }

    fn sink_type(&self) -> &'static str {
        "InfluxDB"
    }
}
