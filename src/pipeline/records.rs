//! Record state machine for the monitoring log grammar
//!
//! ```text
//! 01,<ignored>,<device name>
//! 02,<ignored>,<field1>,<field2>,...
//! 80,<DD-MM-YYYY HH:MM:SS>,<value1>,<value2>,...
//! ```
//!
//! Rows are fed strictly in file order. A `02` row replaces the field schema
//! for every following `80` row; the device set by `01` survives schema
//! changes. Both start empty; a pass builds a fresh machine so nothing
//! carries over from the previous file.

use super::coercion::{self, ReferenceZone};
use super::types::{RecordCode, Sample};
use chrono::{DateTime, Utc};
use std::fmt;

/// Data row cells start after the record code and timestamp
const VALUE_OFFSET: usize = 2;

/// A problem worth logging that did not stop the row
#[derive(Debug, Clone, PartialEq)]
pub enum Diagnostic {
    UnparseableValue { field: String, raw: String },
    MissingValue { field: String },
    InvalidTimestamp { raw: String },
    TruncatedRow { code: RecordCode, columns: usize },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::UnparseableValue { raw, .. } => {
                write!(f, "skipping value which cannot be parsed: {}", raw)
            }
            Diagnostic::MissingValue { field } => {
                write!(f, "data row has no column for field '{}'", field)
            }
            Diagnostic::InvalidTimestamp { raw } => {
                write!(f, "unparseable timestamp '{}', using zero time", raw)
            }
            Diagnostic::TruncatedRow { code, columns } => {
                write!(f, "ignoring {:?} row with only {} columns", code, columns)
            }
        }
    }
}

/// Everything one row produced
#[derive(Debug, Default, PartialEq)]
pub struct FeedOutcome {
    pub samples: Vec<Sample>,
    pub diagnostics: Vec<Diagnostic>,
    /// Cells holding the `N/A` sentinel, skipped without a diagnostic
    pub missing_readings: usize,
    /// The row timestamp was read as UTC because the reference zone was unavailable
    pub used_fallback_zone: bool,
}

/// Device and schema context for one pass
pub struct RecordStateMachine {
    zone: ReferenceZone,
    device: String,
    schema: Vec<String>,
}

impl RecordStateMachine {
    pub fn new(zone: ReferenceZone) -> Self {
        Self {
            zone,
            device: String::new(),
            schema: Vec::new(),
        }
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn schema(&self) -> &[String] {
        &self.schema
    }

    /// Consume one row, returning the samples it yields
    pub fn feed<S: AsRef<str>>(&mut self, row: &[S]) -> FeedOutcome {
        let Some(code) = row.first() else {
            return FeedOutcome::default();
        };

        match RecordCode::parse(code.as_ref()) {
            RecordCode::Device => self.on_device(row),
            RecordCode::Schema => self.on_schema(row),
            RecordCode::Data => self.on_data(row),
            RecordCode::Other => FeedOutcome::default(),
        }
    }

    fn on_device<S: AsRef<str>>(&mut self, row: &[S]) -> FeedOutcome {
        match row.get(2) {
            Some(name) => {
                self.device = name.as_ref().trim().to_string();
                FeedOutcome::default()
            }
            None => truncated(RecordCode::Device, row.len()),
        }
    }

    fn on_schema<S: AsRef<str>>(&mut self, row: &[S]) -> FeedOutcome {
        self.schema = row
            .iter()
            .skip(VALUE_OFFSET)
            .map(|name| name.as_ref().trim().to_lowercase())
            .collect();
        FeedOutcome::default()
    }

    fn on_data<S: AsRef<str>>(&self, row: &[S]) -> FeedOutcome {
        let mut outcome = FeedOutcome::default();
        if self.schema.is_empty() {
            return outcome;
        }

        let Some(raw_timestamp) = row.get(1) else {
            return truncated(RecordCode::Data, row.len());
        };

        let timestamp = match coercion::parse_timestamp(raw_timestamp.as_ref(), &self.zone) {
            Ok(parsed) => {
                outcome.used_fallback_zone = parsed.used_fallback_zone;
                parsed.at
            }
            Err(_) => {
                outcome.diagnostics.push(Diagnostic::InvalidTimestamp {
                    raw: raw_timestamp.as_ref().trim().to_string(),
                });
                DateTime::<Utc>::UNIX_EPOCH
            }
        };

        for (i, field) in self.schema.iter().enumerate() {
            let Some(raw) = row.get(i + VALUE_OFFSET) else {
                outcome.diagnostics.push(Diagnostic::MissingValue {
                    field: field.clone(),
                });
                continue;
            };
            let raw = raw.as_ref().trim();

            match coercion::parse_value(raw) {
                Ok(value) => outcome.samples.push(Sample {
                    device: self.device.clone(),
                    field: field.clone(),
                    value,
                    timestamp,
                }),
                Err(_) if coercion::is_missing(raw) => outcome.missing_readings += 1,
                Err(_) => outcome.diagnostics.push(Diagnostic::UnparseableValue {
                    field: field.clone(),
                    raw: raw.to_string(),
                }),
            }
        }

        outcome
    }
}

fn truncated(code: RecordCode, columns: usize) -> FeedOutcome {
    FeedOutcome {
        diagnostics: vec![Diagnostic::TruncatedRow { code, columns }],
        ..FeedOutcome::default()
    }
}
