//! One ingestion pass over the monitoring log
//!
//! ```text
//! FileGate::acquire → csv rows → RecordStateMachine → SinkDispatch::add
//!     ↓
//! LockedFile::release → SinkDispatch::flush
//! ```
//!
//! The lock is released on every exit path once acquired, and sinks are
//! flushed whenever a file was read, even partially.

use super::coercion::ReferenceZone;
use super::dispatch::SinkDispatch;
use super::file_gate::{FileGate, GateError, LockedFile};
use super::records::{Diagnostic, RecordStateMachine};
use crate::exporter::MetricSink;
use std::borrow::Cow;
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug)]
pub enum PassError {
    Gate(GateError),
    Read(csv::Error),
}

impl PassError {
    /// Lock protocol failures leave file ownership unknown
    pub fn is_lock_failure(&self) -> bool {
        matches!(self, PassError::Gate(_))
    }
}

impl From<GateError> for PassError {
    fn from(err: GateError) -> Self {
        PassError::Gate(err)
    }
}

impl From<csv::Error> for PassError {
    fn from(err: csv::Error) -> Self {
        PassError::Read(err)
    }
}

impl std::fmt::Display for PassError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PassError::Gate(e) => write!(f, "Lock error: {}", e),
            PassError::Read(e) => write!(f, "Read error: {}", e),
        }
    }
}

impl std::error::Error for PassError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PassError::Gate(e) => Some(e),
            PassError::Read(e) => Some(e),
        }
    }
}

/// Counters for one processed file
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PassStats {
    pub rows: u64,
    pub samples: u64,
    pub missing_readings: u64,
    pub diagnostics: u64,
    pub fallback_zone_rows: u64,
    pub sink_add_failures: u64,
    pub sink_flush_failures: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PassOutcome {
    /// The log file did not exist; nothing was touched
    NoFile,
    Processed(PassStats),
}

pub struct Pipeline {
    gate: FileGate,
    zone: ReferenceZone,
    dispatch: SinkDispatch,
}

impl Pipeline {
    pub fn new(
        log_path: impl Into<PathBuf>,
        zone: ReferenceZone,
        sinks: Vec<Arc<dyn MetricSink>>,
    ) -> Self {
        Self {
            gate: FileGate::new(log_path),
            zone,
            dispatch: SinkDispatch::new(sinks),
        }
    }

    pub fn gate(&self) -> &FileGate {
        &self.gate
    }

    pub fn dispatch(&self) -> &SinkDispatch {
        &self.dispatch
    }

    /// Run one acquire → parse → dispatch → release → flush pass
    pub async fn run_pass(&self) -> Result<PassOutcome, PassError> {
        let Some(mut locked) = self.gate.acquire()? else {
            return Ok(PassOutcome::NoFile);
        };

        let reader = locked.take_reader();
        self.process_locked(locked, reader).await
    }

    /// Everything after acquisition: parse, release, flush
    async fn process_locked<R: Read + Send>(
        &self,
        locked: LockedFile,
        reader: Option<R>,
    ) -> Result<PassOutcome, PassError> {
        log::info!("📂 Processing file: {}", self.gate.path().display());
        let pass_start = Instant::now();

        let mut stats = PassStats::default();
        let parsed = match reader {
            Some(reader) => self.ingest(reader, &mut stats),
            None => Ok(()),
        };

        // Release before flushing so the producer's next file is never blocked on sinks
        let released = locked.release();

        stats.sink_flush_failures = self.dispatch.flush().await as u64;

        if let Err(e) = parsed {
            if let Err(release_err) = released {
                log::error!("❌ Read failed before lock release failure: {}", e);
                return Err(release_err.into());
            }
            return Err(e);
        }
        released?;

        log::info!(
            "📊 Pass complete: {} rows, {} samples, {} missing, {} diagnostics | sink failures: {} add / {} flush | {}ms",
            stats.rows,
            stats.samples,
            stats.missing_readings,
            stats.diagnostics,
            stats.sink_add_failures,
            stats.sink_flush_failures,
            pass_start.elapsed().as_millis()
        );

        Ok(PassOutcome::Processed(stats))
    }

    fn ingest<R: Read>(&self, reader: R, stats: &mut PassStats) -> Result<(), PassError> {
        let mut rows = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(reader);

        // Device and schema never carry over between passes
        let mut machine = RecordStateMachine::new(self.zone.clone());
        let mut record = csv::ByteRecord::new();

        while rows.read_byte_record(&mut record)? {
            stats.rows += 1;

            // The producer does not guarantee UTF-8
            let row: Vec<Cow<'_, str>> = record.iter().map(String::from_utf8_lossy).collect();
            let outcome = machine.feed(&row);

            for diagnostic in &outcome.diagnostics {
                match diagnostic {
                    Diagnostic::UnparseableValue { .. } => log::info!("{}", diagnostic),
                    _ => log::warn!("⚠️  Row {}: {}", stats.rows, diagnostic),
                }
            }
            stats.diagnostics += outcome.diagnostics.len() as u64;
            stats.missing_readings += outcome.missing_readings as u64;
            if outcome.used_fallback_zone {
                stats.fallback_zone_rows += 1;
            }

            for sample in &outcome.samples {
                stats.sink_add_failures += self.dispatch.add(sample) as u64;
            }
            stats.samples += outcome.samples.len() as u64;
        }

        if stats.fallback_zone_rows > 0 {
            log::warn!(
                "⚠️  {} rows read as UTC: time zone '{}' unavailable",
                stats.fallback_zone_rows,
                self.zone.name()
            );
        }

        Ok(())
    }
}
