//! Research job records.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Process-unique job identifier, assigned from 1 upwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct JobId(pub u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state. `InProgress` is the only non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, JobStatus::InProgress)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::InProgress => "in_progress",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of one research job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Job {
    pub id: JobId,
    pub model: String,
    pub query: String,
    pub status: JobStatus,
    pub started_at: DateTime<Utc>,
    /// Set once, on the first terminal transition.
    pub ended_at: Option<DateTime<Utc>>,
    /// Report text; only on `Completed`.
    pub result: Option<String>,
    pub citations: Vec<String>,
    /// Only on `Failed`.
    pub error: Option<String>,
}

/// What a successful strategy produces.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResearchOutcome {
    pub report: String,
    pub citations: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_display() {
        assert_eq!(JobStatus::InProgress.to_string(), "in_progress");
        assert_eq!(JobStatus::Cancelled.to_string(), "cancelled");
        assert!(!JobStatus::InProgress.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&JobStatus::InProgress).unwrap();
        assert_eq!(json, "\"in_progress\"");
    }
}
