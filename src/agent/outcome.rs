//! Per-iteration job outcomes and their numeric codes.
//!
//! Codes are consumed by external collectors and must stay stable:
//! 0 no change, 1 committed, 3 validation or command failure,
//! 4 filesystem failure.

use crate::agent::job::Job;
use crate::observability::metrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    /// Destination already current, or the server answered 204.
    NoChange,
    Committed,
    /// Promoted, but the reload command failed.
    ReloadFailed,
    /// Fetch, decode, document check, render or validation failed.
    Failed,
    FilesystemFailure,
}

impl JobOutcome {
    pub fn code(self) -> u8 {
        match self {
            JobOutcome::NoChange => 0,
            JobOutcome::Committed | JobOutcome::ReloadFailed => 1,
            JobOutcome::Failed => 3,
            JobOutcome::FilesystemFailure => 4,
        }
    }

    /// Telemetry line for plugin mode.
    pub fn telemetry_line(self, job: &Job) -> String {
        format!(
            "confd,src={},dest={} success={}",
            job.src.display(),
            job.dest.display(),
            self.code()
        )
    }

    pub fn record(self, job: &Job) {
        metrics::record_job_outcome(
            &job.src.display().to_string(),
            &job.dest.display().to_string(),
            self.code(),
        );
    }
}
