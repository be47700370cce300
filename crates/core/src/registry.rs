//! Job status registry.
//!
//! [`JobRegistry`] is the single source of truth for where a job is in its
//! lifecycle. The HTTP layer holds it as `Arc<dyn JobRegistry>` so the
//! in-memory store can be replaced by a persistent one without touching
//! callers.
//!
//! Writers: the submission path inserts `pending`; the scan orchestrator
//! moves the job to `in_progress` and records the terminal outcome. Every
//! other caller only reads.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::CoreError;
use crate::scanning::executor::Strategy;
use crate::status::JobStatus;
use crate::types::{JobId, Timestamp};

/// Everything the service tracks about one scan job.
#[derive(Debug, Clone)]
pub struct JobRecord {
    pub id: JobId,
    pub status: JobStatus,
    /// Workspace directory created at submission.
    pub workspace: PathBuf,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    /// Strategy that produced the terminal result, once known.
    pub strategy: Option<Strategy>,
    /// Captured (bounded) scanner stdout.
    pub stdout: Option<String>,
    /// Captured (bounded) scanner stderr.
    pub stderr: Option<String>,
    /// Human-readable failure reason for `failed` jobs.
    pub failure_reason: Option<String>,
}

impl JobRecord {
    /// A freshly submitted job.
    pub fn pending(id: JobId, workspace: PathBuf) -> Self {
        let now = chrono::Utc::now();
        Self {
            id,
            status: JobStatus::Pending,
            workspace,
            created_at: now,
            updated_at: now,
            strategy: None,
            stdout: None,
            stderr: None,
            failure_reason: None,
        }
    }
}

/// Terminal result recorded by [`JobRegistry::finish`].
#[derive(Debug, Clone)]
pub struct JobOutcome {
    /// Must be `completed` or `failed`.
    pub status: JobStatus,
    pub strategy: Option<Strategy>,
    pub stdout: Option<String>,
    pub stderr: Option<String>,
    pub failure_reason: Option<String>,
}

impl JobOutcome {
    /// A failure with only a reason attached (no runner output).
    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            status: JobStatus::Failed,
            strategy: None,
            stdout: None,
            stderr: None,
            failure_reason: Some(reason.into()),
        }
    }
}

/// Storage for job lifecycle records.
///
/// Implementations must be safe for many concurrent readers while a single
/// writer updates a given job, and must reject non-monotonic transitions.
#[async_trait]
pub trait JobRegistry: Send + Sync {
    /// Register a new job. Fails with `Conflict` if the id is already known.
    async fn insert(&self, record: JobRecord) -> Result<(), CoreError>;

    /// Snapshot of a job's record.
    async fn get(&self, job_id: JobId) -> Option<JobRecord>;

    /// Current status of a job.
    async fn status(&self, job_id: JobId) -> Result<JobStatus, CoreError> {
        self.get(job_id)
            .await
            .map(|record| record.status)
            .ok_or_else(|| CoreError::job_not_found(job_id))
    }

    /// Move a job to `status`. Rejects backward or repeated transitions with
    /// `InvalidState`.
    async fn set_status(&self, job_id: JobId, status: JobStatus) -> Result<(), CoreError>;

    /// Move a job from `expected` to `new` only if it is currently
    /// `expected`. Returns whether the swap happened.
    async fn compare_and_set(
        &self,
        job_id: JobId,
        expected: JobStatus,
        new: JobStatus,
    ) -> Result<bool, CoreError>;

    /// Record a job's terminal state together with its diagnostics.
    async fn finish(&self, job_id: JobId, outcome: JobOutcome) -> Result<(), CoreError>;

    /// Snapshot of every tracked job.
    async fn list(&self) -> Vec<JobRecord>;

    /// Forget a job. Returns the removed record, if any.
    async fn remove(&self, job_id: JobId) -> Option<JobRecord>;
}

/// Process-local registry backed by a `RwLock<HashMap>`.
#[derive(Default)]
pub struct InMemoryJobRegistry {
    jobs: RwLock<HashMap<JobId, JobRecord>>,
}

impl InMemoryJobRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

fn check_transition(record: &JobRecord, next: JobStatus) -> Result<(), CoreError> {
    if record.status.can_transition_to(next) {
        Ok(())
    } else {
        Err(CoreError::InvalidState {
            status: record.status,
        })
    }
}

#[async_trait]
impl JobRegistry for InMemoryJobRegistry {
    async fn insert(&self, record: JobRecord) -> Result<(), CoreError> {
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(&record.id) {
            return Err(CoreError::Conflict(format!(
                "Job {} is already registered",
                record.id
            )));
        }
        jobs.insert(record.id, record);
        Ok(())
    }

    async fn get(&self, job_id: JobId) -> Option<JobRecord> {
        self.jobs.read().await.get(&job_id).cloned()
    }

    async fn set_status(&self, job_id: JobId, status: JobStatus) -> Result<(), CoreError> {
        let mut jobs = self.jobs.write().await;
        let record = jobs
            .get_mut(&job_id)
            .ok_or_else(|| CoreError::job_not_found(job_id))?;
        check_transition(record, status)?;
        record.status = status;
        record.updated_at = chrono::Utc::now();
        Ok(())
    }

    async fn compare_and_set(
        &self,
        job_id: JobId,
        expected: JobStatus,
        new: JobStatus,
    ) -> Result<bool, CoreError> {
        let mut jobs = self.jobs.write().await;
        let record = jobs
            .get_mut(&job_id)
            .ok_or_else(|| CoreError::job_not_found(job_id))?;
        if record.status != expected {
            return Ok(false);
        }
        check_transition(record, new)?;
        record.status = new;
        record.updated_at = chrono::Utc::now();
        Ok(true)
    }

    async fn finish(&self, job_id: JobId, outcome: JobOutcome) -> Result<(), CoreError> {
        if !outcome.status.is_terminal() {
            return Err(CoreError::Internal(format!(
                "finish called with non-terminal status {}",
                outcome.status
            )));
        }

        let mut jobs = self.jobs.write().await;
        let record = jobs
            .get_mut(&job_id)
            .ok_or_else(|| CoreError::job_not_found(job_id))?;
        check_transition(record, outcome.status)?;

        record.status = outcome.status;
        record.strategy = outcome.strategy;
        record.stdout = outcome.stdout;
        record.stderr = outcome.stderr;
        record.failure_reason = outcome.failure_reason;
        record.updated_at = chrono::Utc::now();
        Ok(())
    }

    async fn list(&self) -> Vec<JobRecord> {
        self.jobs.read().await.values().cloned().collect()
    }

    async fn remove(&self, job_id: JobId) -> Option<JobRecord> {
        self.jobs.write().await.remove(&job_id)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
