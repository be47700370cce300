//! Scan orchestrator service.
//!
//! Drives one job from `pending` to a terminal state: claims the job, runs
//! the fallback controller, normalizes the report on success and records
//! the outcome in the registry. Held by the
//! [`JobDispatcher`](crate::engine::dispatcher::JobDispatcher) as an
//! `Arc<ScanOrchestrator>`.

use std::sync::Arc;

use scanguard_core::error::CoreError;
use scanguard_core::registry::{JobOutcome, JobRegistry};
use scanguard_core::report;
use scanguard_core::scanning::executor::RunRequest;
use scanguard_core::scanning::fallback::{Execution, FallbackController};
use scanguard_core::scanning::subprocess::truncate_diagnostic;
use scanguard_core::status::JobStatus;
use scanguard_core::types::JobId;
use scanguard_core::workspace::WorkspaceManager;

use crate::error::{AppError, AppResult};

/// Runs scans and records their results.
///
/// Lifecycle of [`run_job`](Self::run_job):
/// 1. Claim the job (`pending` -> `in_progress`, compare-and-set).
/// 2. Resolve the workspace.
/// 3. Execute through the fallback controller.
/// 4. On success, normalize the raw report.
/// 5. Record `completed` or `failed` with bounded diagnostics.
pub struct ScanOrchestrator {
    registry: Arc<dyn JobRegistry>,
    workspaces: Arc<WorkspaceManager>,
    controller: FallbackController,
    max_diagnostic_bytes: usize,
}

impl ScanOrchestrator {
    pub fn new(
        registry: Arc<dyn JobRegistry>,
        workspaces: Arc<WorkspaceManager>,
        controller: FallbackController,
        max_diagnostic_bytes: usize,
    ) -> Self {
        Self {
            registry,
            workspaces,
            controller,
            max_diagnostic_bytes,
        }
    }

    /// Run a submitted job to completion and return its terminal status.
    ///
    /// Fails with `InvalidState` if the job is no longer `pending`; nothing
    /// is executed in that case.
    pub async fn run_job(&self, job_id: JobId) -> AppResult<JobStatus> {
        // 1. Claim.
        let claimed = self
            .registry
            .compare_and_set(job_id, JobStatus::Pending, JobStatus::InProgress)
            .await?;
        if !claimed {
            let status = self.registry.status(job_id).await?;
            return Err(AppError::Core(CoreError::InvalidState { status }));
        }
        tracing::info!(%job_id, "Scan started");

        // 2. Workspace.
        let workspace = match self.workspaces.workspace_path(job_id).await {
            Ok(path) => path,
            Err(e) => {
                let reason = format!("Workspace unavailable: {e}");
                self.registry
                    .finish(job_id, JobOutcome::failed(reason.clone()))
                    .await?;
                tracing::error!(%job_id, error = %e, "Scan failed before execution");
                return Ok(JobStatus::Failed);
            }
        };

        // 3. Execute.
        let request = RunRequest { job_id, workspace };
        let execution = self.controller.execute(&request).await;

        // 4-5. Record.
        let outcome = if execution.is_success() {
            self.complete(job_id, &execution).await
        } else {
            self.failure_outcome(&execution, None)
        };
        let status = outcome.status;
        self.registry.finish(job_id, outcome).await?;

        match status {
            JobStatus::Completed => tracing::info!(
                %job_id,
                strategy = %execution.strategy,
                "Scan completed",
            ),
            _ => tracing::warn!(
                %job_id,
                strategy = %execution.strategy,
                reason = execution.outcome.failure_reason().as_deref().unwrap_or("normalization failed"),
                "Scan failed",
            ),
        }
        Ok(status)
    }

    /// Normalize the raw report of a successful run.
    async fn complete(&self, job_id: JobId, execution: &Execution) -> JobOutcome {
        let raw = self.workspaces.raw_report_path(job_id);
        let normalized = self.workspaces.normalized_report_path(job_id);

        match report::normalize(&raw, &normalized).await {
            Ok(rows) => {
                tracing::debug!(%job_id, rows, "Report ready");
                self.outcome_with_output(execution, JobStatus::Completed)
            }
            Err(e) => {
                tracing::error!(%job_id, error = %e, "Report normalization failed");
                self.failure_outcome(execution, Some(format!("Report normalization failed: {e}")))
            }
        }
    }

    fn failure_outcome(&self, execution: &Execution, reason: Option<String>) -> JobOutcome {
        let mut reason = reason
            .or_else(|| execution.outcome.failure_reason())
            .unwrap_or_else(|| "Scan failed".to_string());
        if let Some(fallback) = &execution.fallback_reason {
            reason.push_str(&format!(" (sandbox unavailable: {fallback})"));
        }

        let mut outcome = self.outcome_with_output(execution, JobStatus::Failed);
        outcome.failure_reason = Some(truncate_diagnostic(&reason, self.max_diagnostic_bytes));
        outcome
    }

    fn outcome_with_output(&self, execution: &Execution, status: JobStatus) -> JobOutcome {
        let output = execution.outcome.output();
        let bounded = |text: &str| truncate_diagnostic(text, self.max_diagnostic_bytes);
        JobOutcome {
            status,
            strategy: Some(execution.strategy),
            stdout: output.map(|o| bounded(&o.stdout)),
            stderr: output.map(|o| bounded(&o.stderr)),
            failure_reason: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use scanguard_core::registry::{InMemoryJobRegistry, JobRecord};
    use scanguard_core::scanning::executor::{
        CapturedOutput, RunOutcome, ScanRunner, Strategy,
    };

    use super::*;

    /// Runner that optionally writes a raw report and returns `outcome`.
    struct ScriptedRunner {
        strategy: Strategy,
        raw_report: Option<&'static str>,
        outcome: RunOutcome,
    }

    #[async_trait]
    impl ScanRunner for ScriptedRunner {
        fn strategy(&self) -> Strategy {
            self.strategy
        }

        async fn run(&self, request: &RunRequest) -> RunOutcome {
            if let Some(raw) = self.raw_report {
                tokio::fs::write(request.workspace.join("cookie_stuffing_report.csv"), raw)
                    .await
                    .expect("write raw report");
            }
            self.outcome.clone()
        }
    }

    fn success() -> RunOutcome {
        RunOutcome::Success(CapturedOutput {
            stdout: "done\n".to_string(),
            ..CapturedOutput::default()
        })
    }

    struct Fixture {
        _tmp: tempfile::TempDir,
        registry: Arc<InMemoryJobRegistry>,
        workspaces: Arc<WorkspaceManager>,
    }

    impl Fixture {
        fn new() -> Self {
            let tmp = tempfile::tempdir().expect("create temp dir");
            let workspaces = Arc::new(WorkspaceManager::new(tmp.path().join("scans")));
            Self {
                _tmp: tmp,
                registry: Arc::new(InMemoryJobRegistry::new()),
                workspaces,
            }
        }

        async fn submit(&self) -> JobId {
            let job_id = uuid::Uuid::new_v4();
            let dir = self
                .workspaces
                .create_workspace(job_id)
                .await
                .expect("create workspace");
            self.workspaces
                .write_input(job_id, b"https://a.com\n")
                .await
                .expect("write input");
            self.registry
                .insert(JobRecord::pending(job_id, dir))
                .await
                .expect("insert");
            job_id
        }

        fn orchestrator(
            &self,
            sandboxed: Option<ScriptedRunner>,
            direct: ScriptedRunner,
        ) -> ScanOrchestrator {
            let sandboxed = sandboxed.map(|r| Arc::new(r) as Arc<dyn ScanRunner>);
            let registry: Arc<dyn JobRegistry> = self.registry.clone();
            ScanOrchestrator::new(
                registry,
                Arc::clone(&self.workspaces),
                FallbackController::new(sandboxed, Arc::new(direct)),
                1024,
            )
        }
    }

    #[tokio::test]
    async fn successful_scan_completes_with_normalized_report() {
        let fx = Fixture::new();
        let job_id = fx.submit().await;
        let orchestrator = fx.orchestrator(
            Some(ScriptedRunner {
                strategy: Strategy::Sandboxed,
                raw_report: Some("type,url,detail,origin,referer\niframe,https://a.com,x,y,z\n"),
                outcome: success(),
            }),
            ScriptedRunner {
                strategy: Strategy::Direct,
                raw_report: None,
                outcome: success(),
            },
        );

        let status = orchestrator.run_job(job_id).await.expect("run job");

        assert_eq!(status, JobStatus::Completed);
        let record = fx.registry.get(job_id).await.expect("record");
        assert_eq!(record.strategy, Some(Strategy::Sandboxed));
        assert_eq!(record.stdout.as_deref(), Some("done\n"));
        let report = std::fs::read_to_string(fx.workspaces.normalized_report_path(job_id))
            .expect("read report");
        assert_eq!(
            report,
            "URL,Status,Risk Level,Attribution Chain\nhttps://a.com,Suspicious,High,Detected iframe tracking\n"
        );
    }

    #[tokio::test]
    async fn success_without_raw_report_completes_with_header_only() {
        let fx = Fixture::new();
        let job_id = fx.submit().await;
        let orchestrator = fx.orchestrator(
            None,
            ScriptedRunner {
                strategy: Strategy::Direct,
                raw_report: None,
                outcome: success(),
            },
        );

        assert_eq!(orchestrator.run_job(job_id).await.expect("run"), JobStatus::Completed);
        assert!(fx.workspaces.has_report(job_id).await);
    }

    #[tokio::test]
    async fn fallback_failure_records_both_reasons() {
        let fx = Fixture::new();
        let job_id = fx.submit().await;
        let orchestrator = fx.orchestrator(
            Some(ScriptedRunner {
                strategy: Strategy::Sandboxed,
                raw_report: None,
                outcome: RunOutcome::EnvironmentUnavailable {
                    reason: "docker not found".to_string(),
                },
            }),
            ScriptedRunner {
                strategy: Strategy::Direct,
                raw_report: None,
                outcome: RunOutcome::ScanLogicFailure {
                    exit_code: Some(1),
                    output: CapturedOutput {
                        stderr: "Traceback".to_string(),
                        ..CapturedOutput::default()
                    },
                },
            },
        );

        assert_eq!(orchestrator.run_job(job_id).await.expect("run"), JobStatus::Failed);

        let record = fx.registry.get(job_id).await.expect("record");
        assert_eq!(record.strategy, Some(Strategy::Direct));
        assert_eq!(record.stderr.as_deref(), Some("Traceback"));
        let reason = record.failure_reason.expect("failure reason");
        assert!(reason.contains("exit code 1"), "{reason}");
        assert!(reason.contains("docker not found"), "{reason}");
        assert!(!fx.workspaces.has_report(job_id).await);
    }

    #[tokio::test]
    async fn job_already_claimed_is_not_run_twice() {
        let fx = Fixture::new();
        let job_id = fx.submit().await;
        let orchestrator = fx.orchestrator(
            None,
            ScriptedRunner {
                strategy: Strategy::Direct,
                raw_report: None,
                outcome: success(),
            },
        );

        orchestrator.run_job(job_id).await.expect("first run");
        let second = orchestrator.run_job(job_id).await;

        assert_matches!(
            second,
            Err(AppError::Core(CoreError::InvalidState {
                status: JobStatus::Completed
            }))
        );
    }

    #[tokio::test]
    async fn unknown_job_is_not_found() {
        let fx = Fixture::new();
        let orchestrator = fx.orchestrator(
            None,
            ScriptedRunner {
                strategy: Strategy::Direct,
                raw_report: None,
                outcome: success(),
            },
        );

        assert_matches!(
            orchestrator.run_job(uuid::Uuid::new_v4()).await,
            Err(AppError::Core(CoreError::NotFound { .. }))
        );
    }

    #[tokio::test]
    async fn missing_workspace_fails_job() {
        let fx = Fixture::new();
        let job_id = fx.submit().await;
        fx.workspaces.remove_workspace(job_id).await.expect("remove");
        let orchestrator = fx.orchestrator(
            None,
            ScriptedRunner {
                strategy: Strategy::Direct,
                raw_report: None,
                outcome: success(),
            },
        );

        assert_eq!(orchestrator.run_job(job_id).await.expect("run"), JobStatus::Failed);
        let record = fx.registry.get(job_id).await.expect("record");
        assert!(record
            .failure_reason
            .expect("reason")
            .starts_with("Workspace unavailable"));
    }
}
