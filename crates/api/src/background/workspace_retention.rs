//! Periodic cleanup of finished scan jobs.
//!
//! Spawns a background task that deletes the workspace and registry entry
//! of every `completed` or `failed` job last updated longer ago than the
//! retention period. Jobs that are still pending or running are never
//! touched. Runs on a fixed interval using `tokio::time::interval`.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use scanguard_core::error::CoreError;
use scanguard_core::registry::JobRegistry;
use scanguard_core::workspace::WorkspaceManager;
use tokio_util::sync::CancellationToken;

/// Delete finished jobs last updated more than `retention` ago.
///
/// Returns the number of jobs removed. A workspace that fails to delete
/// keeps its registry entry so the next sweep retries it.
pub async fn sweep(
    registry: &dyn JobRegistry,
    workspaces: &WorkspaceManager,
    retention: Duration,
) -> Result<usize, CoreError> {
    let retention = chrono::Duration::from_std(retention)
        .map_err(|e| CoreError::Internal(format!("invalid retention period: {e}")))?;
    let cutoff = Utc::now() - retention;

    let mut removed = 0;
    for record in registry.list().await {
        if !record.status.is_terminal() || record.updated_at > cutoff {
            continue;
        }
        if let Err(e) = workspaces.remove_workspace(record.id).await {
            tracing::warn!(job_id = %record.id, error = %e, "Failed to remove workspace");
            continue;
        }
        registry.remove(record.id).await;
        removed += 1;
    }
    Ok(removed)
}

/// Run the retention loop until `cancel` is triggered.
pub async fn run(
    registry: Arc<dyn JobRegistry>,
    workspaces: Arc<WorkspaceManager>,
    retention: Duration,
    interval: Duration,
    cancel: CancellationToken,
) {
    tracing::info!(
        retention_hours = retention.as_secs() / 3600,
        interval_secs = interval.as_secs(),
        "Workspace retention job started"
    );

    let mut ticker = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Workspace retention job stopping");
                break;
            }
            _ = ticker.tick() => {
                match sweep(registry.as_ref(), &workspaces, retention).await {
                    Ok(0) => tracing::debug!("Workspace retention: nothing to purge"),
                    Ok(removed) => {
                        tracing::info!(removed, "Workspace retention: purged finished jobs");
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Workspace retention: cleanup failed");
                    }
                }
            }
        }
    }
}
