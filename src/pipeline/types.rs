//! Core data structures for the ingestion pipeline

use chrono::{DateTime, Utc};

/// Leading column of a monitoring log row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordCode {
    /// `01` - device identity
    Device,
    /// `02` - field names for subsequent data rows
    Schema,
    /// `80` - timestamped readings
    Data,
    /// Anything else; ignored
    Other,
}

impl RecordCode {
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "01" => RecordCode::Device,
            "02" => RecordCode::Schema,
            "80" => RecordCode::Data,
            _ => RecordCode::Other,
        }
    }
}

/// One reading forwarded to every sink
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub device: String,
    pub field: String,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}
