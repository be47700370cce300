//! Runner interface and shared types.
//!
//! Defines [`ScanRunner`], the trait both execution strategies implement,
//! along with [`RunRequest`], [`CapturedOutput`], and the tagged
//! [`RunOutcome`] the fallback controller branches on.

use std::fmt;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::JobId;

/// Which execution strategy produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Scanner image run through the container runtime.
    Sandboxed,
    /// Scanner script run with the local interpreter.
    Direct,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sandboxed => f.write_str("sandboxed"),
            Self::Direct => f.write_str("direct"),
        }
    }
}

/// What a runner needs to execute one job.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub job_id: JobId,
    /// Job workspace; the scanner's working directory.
    pub workspace: PathBuf,
}

/// Output captured from the scanner process, each stream bounded by the
/// runner's capture limit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedOutput {
    pub stdout: String,
    pub stderr: String,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
}

impl CapturedOutput {
    /// Both streams joined for diagnostics, stdout first.
    pub fn combined(&self) -> String {
        match (self.stdout.is_empty(), self.stderr.is_empty()) {
            (_, true) => self.stdout.clone(),
            (true, false) => self.stderr.clone(),
            (false, false) => format!("{}\n{}", self.stdout, self.stderr),
        }
    }
}

/// Result of one runner attempt.
///
/// `EnvironmentUnavailable` means the scanner never started and is the only
/// variant that may trigger a fallback. `ScanLogicFailure` and `TimedOut`
/// mean the scanner ran and the outcome is final.
#[derive(Debug, Clone)]
pub enum RunOutcome {
    /// The scanner exited 0.
    Success(CapturedOutput),
    /// The execution environment could not be used (runtime absent, image
    /// missing, interpreter or script missing).
    EnvironmentUnavailable { reason: String },
    /// The scanner started and exited non-zero (or was killed by a signal).
    ScanLogicFailure {
        exit_code: Option<i32>,
        output: CapturedOutput,
    },
    /// The scanner exceeded the maximum execution duration and was killed.
    TimedOut {
        elapsed_ms: u64,
        output: CapturedOutput,
    },
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Captured output, if the scanner got far enough to produce any.
    pub fn output(&self) -> Option<&CapturedOutput> {
        match self {
            Self::Success(output)
            | Self::ScanLogicFailure { output, .. }
            | Self::TimedOut { output, .. } => Some(output),
            Self::EnvironmentUnavailable { .. } => None,
        }
    }

    /// Short description of why the attempt failed; `None` on success.
    pub fn failure_reason(&self) -> Option<String> {
        match self {
            Self::Success(_) => None,
            Self::EnvironmentUnavailable { reason } => {
                Some(format!("Execution environment unavailable: {reason}"))
            }
            Self::ScanLogicFailure {
                exit_code: Some(code),
                ..
            } => Some(format!("Scanner failed with exit code {code}")),
            Self::ScanLogicFailure {
                exit_code: None, ..
            } => Some("Scanner terminated by signal".to_string()),
            Self::TimedOut { elapsed_ms, .. } => {
                Some(format!("Scanner timed out after {elapsed_ms}ms"))
            }
        }
    }
}

/// An execution strategy for the external scanner.
///
/// Implementations never return errors: every failure is classified into a
/// [`RunOutcome`] variant so the fallback decision is made on the type.
#[async_trait]
pub trait ScanRunner: Send + Sync {
    /// Which strategy this runner implements.
    fn strategy(&self) -> Strategy;

    /// Run the scanner against the request's workspace.
    async fn run(&self, request: &RunRequest) -> RunOutcome;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
