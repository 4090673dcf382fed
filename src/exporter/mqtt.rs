//! MQTT sink publishing per-field summaries.
//!
//! Each flush publishes one JSON document keyed by field name:
//! ```text
//! {"gpu temperature":{"min":41.0,"max":55.5,"last":55.5,"count":3,"mean":48.2}}
//! ```

use super::backend::{MetricSink, SinkError};
use super::batch::Batch;
use crate::config::MqttConfig;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rumqttc::{AsyncClient, EventLoop, MqttOptions, QoS};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::task::JoinHandle;

const REQUEST_CAPACITY: usize = 10;
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Running summary of one field between flushes
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FieldAggregate {
    pub min: f64,
    pub max: f64,
    pub last: f64,
    pub count: u64,
    pub mean: f64,
    #[serde(skip)]
    sum: f64,
}

impl FieldAggregate {
    pub fn register(&mut self, value: f64) {
        if self.count == 0 || value < self.min {
            self.min = value;
        }
        if self.count == 0 || value > self.max {
            self.max = value;
        }
        self.last = value;
        self.count += 1;
        self.sum += value;
        self.mean = self.sum / self.count as f64;
    }
}

pub type FieldSummaries = BTreeMap<String, FieldAggregate>;

pub struct MqttSink {
    client: AsyncClient,
    topic: String,
    metrics: Batch<FieldSummaries>,
    event_task: Option<JoinHandle<()>>,
}

impl MqttSink {
    /// Connect to the broker and spawn the task driving the MQTT event loop.
    ///
    /// Must be called from within a tokio runtime.
    pub fn connect(config: &MqttConfig) -> Self {
        let mut options = MqttOptions::new(&config.client_id, &config.broker, config.port);
        options.set_keep_alive(Duration::from_secs(30));

        let (client, eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);
        let event_task = tokio::spawn(drive_event_loop(eventloop));

        log::info!(
            "✅ MQTT sink initialized (tcp://{}:{}, topic: {})",
            config.broker,
            config.port,
            config.topic
        );

        Self {
            client,
            topic: config.topic.clone(),
            metrics: Batch::new(),
            event_task: Some(event_task),
        }
    }

    /// Build a sink around an existing client whose event loop the caller drives.
    pub fn with_client(client: AsyncClient, topic: impl Into<String>) -> Self {
        Self {
            client,
            topic: topic.into(),
            metrics: Batch::new(),
            event_task: None,
        }
    }

    /// Snapshot of the summaries accumulated since the last flush
    pub fn pending(&self) -> FieldSummaries {
        self.metrics.with(|metrics| metrics.clone())
    }
}

impl Drop for MqttSink {
    fn drop(&mut self) {
        if let Some(task) = self.event_task.take() {
            task.abort();
        }
    }
}

async fn drive_event_loop(mut eventloop: EventLoop) {
    loop {
        if let Err(e) = eventloop.poll().await {
            log::warn!("⚠️  MQTT connection error: {}", e);
            tokio::time::sleep(RECONNECT_DELAY).await;
        }
    }
}

#[async_trait]
impl MetricSink for MqttSink {
    fn add_to_batch(
        &self,
        _device: &str,
        field: &str,
        value: f64,
        _timestamp: DateTime<Utc>,
    ) -> Result<(), SinkError> {
        self.metrics.with(|metrics| {
            metrics.entry(field.to_string()).or_default().register(value);
        });
        Ok(())
    }

    async fn flush(&self) -> Result<(), SinkError> {
        let metrics = self.metrics.take();
        if metrics.is_empty() {
            return Ok(());
        }

        let payload = serde_json::to_vec(&metrics)?;
        // Never wait on the request queue; it stops draining while the broker is down
        self.client
            .try_publish(self.topic.as_str(), QoS::AtMostOnce, false, payload)?;

        log::debug!("✅ Published {} field summaries to {}", metrics.len(), self.topic);
        Ok(())
    }

    fn sink_type(&self) -> &'static str {
        "MQTT"
    }
}
