//! Sink trait for exported samples
//!
//! Defines the interface every export backend (InfluxDB, MQTT, JSONL) implements.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[derive(Debug)]
pub enum SinkError {
    Io(std::io::Error),
    Serialization(serde_json::Error),
    Http(reqwest::Error),
    Mqtt(rumqttc::ClientError),
    Rejected(String),
}

impl From<std::io::Error> for SinkError {
    fn from(err: std::io::Error) -> Self {
        SinkError::Io(err)
    }
}

impl From<serde_json::Error> for SinkError {
    fn from(err: serde_json::Error) -> Self {
        SinkError::Serialization(err)
    }
}

impl From<reqwest::Error> for SinkError {
    fn from(err: reqwest::Error) -> Self {
        SinkError::Http(err)
    }
}

impl From<rumqttc::ClientError> for SinkError {
    fn from(err: rumqttc::ClientError) -> Self {
        SinkError::Mqtt(err)
    }
}

impl std::fmt::Display for SinkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SinkError::Io(e) => write!(f, "IO error: {}", e),
            SinkError::Serialization(e) => write!(f, "Serialization error: {}", e),
            SinkError::Http(e) => write!(f, "HTTP error: {}", e),
            SinkError::Mqtt(e) => write!(f, "MQTT error: {}", e),
            SinkError::Rejected(msg) => write!(f, "Rejected: {}", msg),
        }
    }
}

impl std::error::Error for SinkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SinkError::Io(e) => Some(e),
            SinkError::Serialization(e) => Some(e),
            SinkError::Http(e) => Some(e),
            SinkError::Mqtt(e) => Some(e),
            SinkError::Rejected(_) => None,
        }
    }
}

/// Backend trait for exporting samples
///
/// Implementations own a private pending batch guarded by a mutex, so
/// `add_to_batch` and `flush` may be called from different tasks.
#[async_trait]
pub trait MetricSink: Send + Sync {
    /// Record one sample into the pending batch.
    ///
    /// Must not perform network I/O.
    fn add_to_batch(
        &self,
        device: &str,
        field: &str,
        value: f64,
        timestamp: DateTime<Utc>,
    ) -> Result<(), SinkError>;

    /// Deliver the pending batch and leave it empty
    async fn flush(&self) -> Result<(), SinkError>;

    /// Get backend type for logging
    fn sink_type(&self) -> &'static str;
}
