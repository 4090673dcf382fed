//! Periodic pass scheduler
//!
//! Each tick runs one pass to completion before the next tick is awaited, so
//! passes never overlap. Ticks that elapse during a long pass are skipped,
//! not queued. Stopping only prevents the next pass; a running pass is never
//! cancelled.

use super::ingestion::{PassError, PassOutcome, Pipeline};
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Duration, Instant, MissedTickBehavior};

/// What to do when a pass fails the lock protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LockFailurePolicy {
    /// Log the failure and try again on the next tick
    #[default]
    Skip,
    /// Stop the scheduler and surface the error through `join`
    Escalate,
}

impl FromStr for LockFailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "skip" => Ok(LockFailurePolicy::Skip),
            "escalate" => Ok(LockFailurePolicy::Escalate),
            other => Err(format!(
                "LOCK_FAILURE_POLICY must be 'skip' or 'escalate', got '{}'",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running,
    Stopped,
}

#[derive(Debug)]
pub enum SchedulerError {
    /// A lock failure under [`LockFailurePolicy::Escalate`]
    Escalated(PassError),
    Join(String),
}

impl std::fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SchedulerError::Escalated(e) => write!(f, "Scheduler stopped after lock failure: {}", e),
            SchedulerError::Join(msg) => write!(f, "Scheduler task failed: {}", msg),
        }
    }
}

impl std::error::Error for SchedulerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SchedulerError::Escalated(e) => Some(e),
            SchedulerError::Join(_) => None,
        }
    }
}

/// Handle to a running scheduler task
pub struct SchedulerHandle {
    state_rx: watch::Receiver<SchedulerState>,
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<Result<(), SchedulerError>>,
}

impl SchedulerHandle {
    pub fn state(&self) -> SchedulerState {
        *self.state_rx.borrow()
    }

    /// Resolve once the scheduler has stopped, by request or by escalation
    pub async fn stopped(&self) {
        let mut state_rx = self.state_rx.clone();
        // Err means the task is gone, which also means stopped
        let _ = state_rx
            .wait_for(|state| *state == SchedulerState::Stopped)
            .await;
    }

    /// Request a stop. No pass starts after this; a running pass finishes.
    pub fn stop(&self) {
        self.stop_tx.send_replace(true);
    }

    /// Wait for the scheduler task to end
    pub async fn join(self) -> Result<(), SchedulerError> {
        match self.task.await {
            Ok(result) => result,
            Err(e) => Err(SchedulerError::Join(e.to_string())),
        }
    }

    /// Stop and wait for any running pass to finish
    pub async fn shutdown(self) -> Result<(), SchedulerError> {
        self.stop();
        self.join().await
    }
}

/// Spawn the scheduler. The first pass runs one `period` after spawning.
///
/// Arguments:
/// - `pipeline`: Pipeline run on every tick
/// - `period`: Time between ticks
/// - `policy`: Reaction to lock protocol failures
pub fn spawn(
    pipeline: Arc<Pipeline>,
    period: Duration,
    policy: LockFailurePolicy,
) -> SchedulerHandle {
    let (state_tx, state_rx) = watch::channel(SchedulerState::Idle);
    let (stop_tx, stop_rx) = watch::channel(false);

    let task = tokio::spawn(run(pipeline, period, policy, state_tx, stop_rx));

    SchedulerHandle {
        state_rx,
        stop_tx,
        task,
    }
}

async fn run(
    pipeline: Arc<Pipeline>,
    period: Duration,
    policy: LockFailurePolicy,
    state: watch::Sender<SchedulerState>,
    mut stop_rx: watch::Receiver<bool>,
) -> Result<(), SchedulerError> {
    log::info!("⏰ Starting scheduler (interval: {}ms)", period.as_millis());

    let mut timer = interval_at(Instant::now() + period, period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let result = loop {
        if *stop_rx.borrow() {
            break Ok(());
        }

        tokio::select! {
            biased;
            changed = stop_rx.changed() => {
                // A dropped handle also stops the scheduler
                if changed.is_err() || *stop_rx.borrow() {
                    break Ok(());
                }
                continue;
            }
            _ = timer.tick() => {}
        }

        // The pass runs outside select! so a stop request cannot cancel it
        state.send_replace(SchedulerState::Running);
        let outcome = pipeline.run_pass().await;
        state.send_replace(SchedulerState::Idle);

        match outcome {
            Ok(PassOutcome::NoFile) => log::debug!("No log file this tick"),
            Ok(PassOutcome::Processed(_)) => {}
            Err(e) if e.is_lock_failure() => {
                log::error!("❌ {}", e);
                match policy {
                    LockFailurePolicy::Skip => {
                        log::error!("   └─ Skipping tick; resolve the lock file to resume ingestion");
                    }
                    LockFailurePolicy::Escalate => break Err(SchedulerError::Escalated(e)),
                }
            }
            Err(e) => log::error!("❌ Pass failed: {}", e),
        }
    };

    state.send_replace(SchedulerState::Stopped);
    log::info!("✅ Scheduler stopped");
    result
}
