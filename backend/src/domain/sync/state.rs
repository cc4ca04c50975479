//! Mutual-exclusion state for the sync orchestrator.
//!
//! Exactly one run may hold the `Running` phase at a time; a second trigger
//! is rejected rather than queued. The service wraps this in a mutex, so all
//! transitions here are plain synchronous methods.

use chrono::{DateTime, Utc};

use super::stats::SyncReport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Running,
}

/// Orchestrator bookkeeping shared between runs and the status endpoint.
#[derive(Debug)]
pub struct SyncState {
    phase: Phase,
    last_sync: Option<DateTime<Utc>>,
    last_report: Option<SyncReport>,
    last_failure: Option<String>,
}

/// Point-in-time view served by `GET /sync/status`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusSnapshot {
    /// Completion time of the last successful run, if any.
    pub last_sync: Option<DateTime<Utc>>,
    /// Whether a run currently holds the lock.
    pub is_syncing: bool,
    /// Report of the most recently finished run, successful or not.
    pub last_report: Option<SyncReport>,
    /// Failure summary of the most recent run, cleared on success.
    pub last_failure: Option<String>,
}

impl SyncState {
    /// Fresh state: idle, nothing synced yet.
    pub fn new() -> Self {
        Self {
            phase: Phase::Idle,
            last_sync: None,
            last_report: None,
            last_failure: None,
        }
    }

    /// Admit a run, or report that one is already in flight.
    pub fn try_begin(&mut self) -> Result<(), AlreadyRunning> {
        match self.phase {
            Phase::Running => Err(AlreadyRunning),
            Phase::Idle => {
                self.phase = Phase::Running;
                Ok(())
            }
        }
    }

    /// Record a successful run; `finished_at` becomes the new `last_sync`.
    pub fn complete(&mut self, finished_at: DateTime<Utc>, report: SyncReport) {
        self.phase = Phase::Idle;
        self.last_sync = Some(finished_at);
        self.last_report = Some(report);
        self.last_failure = None;
    }

    /// Record an aborted run. `last_sync` keeps its previous value so the
    /// next run re-covers the window the failed run missed.
    pub fn fail(&mut self, reason: String, report: Option<SyncReport>) {
        self.phase = Phase::Idle;
        self.last_failure = Some(reason);
        if report.is_some() {
            self.last_report = report;
        }
    }

    /// Current view for the status endpoint.
    pub fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            last_sync: self.last_sync,
            is_syncing: self.phase == Phase::Running,
            last_report: self.last_report.clone(),
            last_failure: self.last_failure.clone(),
        }
    }
}

impl Default for SyncState {
    fn default() -> Self {
        Self::new()
    }
}

/// Returned when a trigger arrives while a run holds the lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("a sync run is already in progress")]
pub struct AlreadyRunning;
