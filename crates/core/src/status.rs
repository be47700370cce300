//! Scan job lifecycle states.
//!
//! A job moves strictly forward: `pending` → `in_progress` → one of the
//! terminal states `completed` / `failed`. [`JobStatus::can_transition_to`]
//! is the single place that encodes this ordering.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle state of a scan job, serialized as its snake_case wire name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Workspace created and input written; waiting for a dispatcher slot.
    Pending,
    /// A runner has been (or is about to be) spawned for the job.
    InProgress,
    /// The scan succeeded and the normalized report is on disk.
    Completed,
    /// Both strategies were exhausted or the scan itself failed.
    Failed,
}

impl JobStatus {
    /// Position in the lifecycle. Terminal states share the highest rank.
    fn rank(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::InProgress => 1,
            Self::Completed | Self::Failed => 2,
        }
    }

    /// Whether the job has reached a final state.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Returns `true` if moving from `self` to `next` keeps the lifecycle
    /// monotonic. Terminal states accept no further transitions.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        !self.is_terminal() && next.rank() > self.rank()
    }

    /// The wire name (`pending`, `in_progress`, `completed`, `failed`).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
