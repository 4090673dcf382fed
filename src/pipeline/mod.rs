//! # Monitoring log ingestion pipeline
//!
//! Periodically takes the monitoring application's log file, parses its
//! record grammar and hands the resulting samples to every configured sink.
//!
//! ## Architecture
//!
//! ```text
//! Scheduler tick
//!     ↓
//! FileGate (rename <path> → <path>.locked)
//!     ↓
//! csv rows → RecordStateMachine (device + schema context)
//!     ↓
//! SinkDispatch::add (every sink, registration order)
//!     ↓
//! LockedFile::release (delete <path>.locked)
//!     ↓
//! SinkDispatch::flush
//! ```
//!
//! ## Module Organization
//!
//! - `types` - Record codes and samples
//! - `coercion` - Numeric and timestamp parsing with fallbacks
//! - `records` - Row-by-row state machine
//! - `file_gate` - Lock protocol around the log file
//! - `dispatch` - Fan-out to sinks with per-sink failure isolation
//! - `ingestion` - One complete pass
//! - `scheduler` - Interval driver with graceful stop

pub mod coercion;
pub mod dispatch;
pub mod file_gate;
pub mod ingestion;
pub mod records;
pub mod scheduler;
pub mod types;

pub use coercion::{CoercionError, ParsedTimestamp, ReferenceZone};
pub use dispatch::SinkDispatch;
pub use file_gate::{FileGate, GateError, LockedFile};
pub use ingestion::{PassError, PassOutcome, PassStats, Pipeline};
pub use records::{Diagnostic, FeedOutcome, RecordStateMachine};
pub use scheduler::{LockFailurePolicy, SchedulerError, SchedulerHandle, SchedulerState};
pub use types::{RecordCode, Sample};
