//! JSONL sink - appends one JSON object per sample to a local file

use super::backend::{MetricSink, SinkError};
use super::batch::Batch;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleRecord {
    pub device: String,
    pub field: String,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

pub struct JsonlSink {
    path: PathBuf,
    pending: Batch<Vec<SampleRecord>>,
}

impl JsonlSink {
    pub fn new(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        log::info!("📝 Writing samples to: {}", path.display());

        Ok(Self {
            path: path.to_path_buf(),
            pending: Batch::new(),
        })
    }
}

#[async_trait]
impl MetricSink for JsonlSink {
    fn add_to_batch(
        &self,
        device: &str,
        field: &str,
        value: f64,
        timestamp: DateTime<Utc>,
    ) -> Result<(), SinkError> {
        let record = SampleRecord {
            device: device.to_string(),
            field: field.to_string(),
            value,
            timestamp,
        };
        self.pending.with(|records| records.push(record));
        Ok(())
    }

    async fn flush(&self) -> Result<(), SinkError> {
        let records = self.pending.take();
        if records.is_empty() {
            return Ok(());
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let mut writer = BufWriter::new(file);

        for record in &records {
            let json = serde_json::to_string(record)?;
            writeln!(writer, "{}", json)?;
        }
        writer.flush()?;

        log::debug!("✅ Appended {} samples to {}", records.len(), self.path.display());
        Ok(())
    }

    fn sink_type(&self) -> &'static str {
        "JSONL"
    }
}
