//! Background scan dispatcher.
//!
//! Submitted job ids are pushed onto a bounded queue through [`JobQueue`].
//! A single long-lived [`JobDispatcher`] task pulls them off, waits for a
//! free concurrency slot and spawns one task per job. On shutdown it stops
//! taking new work, fails jobs still waiting in the queue and waits for the
//! in-flight scans.

use std::sync::Arc;

use scanguard_core::error::CoreError;
use scanguard_core::registry::{JobOutcome, JobRegistry};
use scanguard_core::types::JobId;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::scanning::orchestrator::ScanOrchestrator;

/// Failure reason recorded for jobs that never started before shutdown.
const SHUTDOWN_REASON: &str = "Service shut down before the scan started";

/// Failure reason recorded when a scan task panics.
const PANIC_REASON: &str = "Scan task failed unexpectedly";

/// Sending half of the dispatch queue. Cheap to clone; held in
/// [`AppState`](crate::state::AppState).
#[derive(Clone)]
pub struct JobQueue {
    tx: mpsc::Sender<JobId>,
}

impl JobQueue {
    /// Queue a job for execution without waiting.
    ///
    /// Fails when the queue is full or the dispatcher has stopped; the
    /// caller owns marking the job failed.
    pub fn enqueue(&self, job_id: JobId) -> Result<(), CoreError> {
        self.tx.try_send(job_id).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                CoreError::Internal("Scan queue is full".to_string())
            }
            mpsc::error::TrySendError::Closed(_) => {
                CoreError::Internal("Scan dispatcher is not running".to_string())
            }
        })
    }
}

/// Create a dispatch queue holding up to `capacity` waiting jobs.
pub fn channel(capacity: usize) -> (JobQueue, mpsc::Receiver<JobId>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (JobQueue { tx }, rx)
}

/// Background scan dispatcher.
pub struct JobDispatcher {
    rx: mpsc::Receiver<JobId>,
    orchestrator: Arc<ScanOrchestrator>,
    registry: Arc<dyn JobRegistry>,
    slots: Arc<Semaphore>,
}

impl JobDispatcher {
    pub fn new(
        rx: mpsc::Receiver<JobId>,
        orchestrator: Arc<ScanOrchestrator>,
        registry: Arc<dyn JobRegistry>,
        max_concurrent: usize,
    ) -> Self {
        Self {
            rx,
            orchestrator,
            registry,
            slots: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    /// Run the dispatcher loop until the cancellation token is triggered,
    /// then drain the queue and wait for in-flight scans.
    pub async fn run(mut self, cancel: CancellationToken) {
        tracing::info!(
            max_concurrent = self.slots.available_permits(),
            "Scan dispatcher started",
        );

        let mut in_flight = JoinSet::new();

        loop {
            // Reap finished tasks so the set does not grow unbounded.
            while let Some(joined) = in_flight.try_join_next() {
                log_join_error(joined);
            }

            let job_id = tokio::select! {
                _ = cancel.cancelled() => break,
                next = self.rx.recv() => match next {
                    Some(job_id) => job_id,
                    None => break,
                },
            };

            let permit = tokio::select! {
                _ = cancel.cancelled() => {
                    self.abandon(job_id).await;
                    break;
                }
                permit = Arc::clone(&self.slots).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let orchestrator = Arc::clone(&self.orchestrator);
            let registry = Arc::clone(&self.registry);
            in_flight.spawn(async move {
                let _permit = permit;
                // Run in its own task so a panic still leaves us the job id.
                let job = tokio::spawn(async move { orchestrator.run_job(job_id).await });
                match job.await {
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => {
                        tracing::error!(%job_id, error = %e, "Scan job could not be run");
                    }
                    Err(e) => {
                        tracing::error!(%job_id, error = %e, "Scan task panicked");
                        if let Err(e) = registry
                            .finish(job_id, JobOutcome::failed(PANIC_REASON))
                            .await
                        {
                            tracing::warn!(%job_id, error = %e, "Failed to mark panicked job as failed");
                        }
                    }
                }
            });
        }

        tracing::info!("Scan dispatcher shutting down");

        // Fail everything still waiting; no new scans start after shutdown.
        self.rx.close();
        while let Some(job_id) = self.rx.recv().await {
            self.abandon(job_id).await;
        }

        let remaining = in_flight.len();
        if remaining > 0 {
            tracing::info!(remaining, "Waiting for in-flight scans");
        }
        while let Some(joined) = in_flight.join_next().await {
            log_join_error(joined);
        }
        tracing::info!("Scan dispatcher stopped");
    }

    async fn abandon(&self, job_id: JobId) {
        if let Err(e) = self
            .registry
            .finish(job_id, JobOutcome::failed(SHUTDOWN_REASON))
            .await
        {
            tracing::warn!(%job_id, error = %e, "Failed to mark queued job as failed");
        }
    }
}

fn log_join_error(joined: Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        tracing::error!(error = %e, "Scan task panicked");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
