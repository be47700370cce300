//! Runner selection with environment-level fallback.
//!
//! ```text
//! Start ──► TrySandboxed ──Success───────────────► Done(success)
//!               │        ──ScanLogicFailure/TimedOut► Done(failure)
//!               └─EnvironmentUnavailable─► TryDirect ──Success──► Done(success)
//!                                                   └─otherwise─► Done(failure)
//! ```
//!
//! Only `EnvironmentUnavailable` moves on to the direct runner. A scan that
//! started and failed is final; retrying it under another strategy would
//! hide the real error. The two runners never run concurrently for a job.

use std::sync::Arc;

use super::executor::{RunOutcome, RunRequest, ScanRunner, Strategy};

/// The single terminal result of a job's execution.
#[derive(Debug, Clone)]
pub struct Execution {
    /// Strategy whose attempt produced `outcome`.
    pub strategy: Strategy,
    pub outcome: RunOutcome,
    /// Why the sandbox was skipped, when the direct runner took over.
    pub fallback_reason: Option<String>,
}

impl Execution {
    pub fn is_success(&self) -> bool {
        self.outcome.is_success()
    }
}

enum Step {
    TrySandboxed,
    TryDirect { fallback_reason: Option<String> },
    Done(Execution),
}

/// Tries the sandboxed runner first and falls back to the direct runner on
/// environment failures.
pub struct FallbackController {
    /// `None` when sandboxing is disabled; execution then starts at the
    /// direct runner.
    sandboxed: Option<Arc<dyn ScanRunner>>,
    direct: Arc<dyn ScanRunner>,
}

impl FallbackController {
    pub fn new(sandboxed: Option<Arc<dyn ScanRunner>>, direct: Arc<dyn ScanRunner>) -> Self {
        Self { sandboxed, direct }
    }

    /// Run the state machine to completion and return the terminal result.
    pub async fn execute(&self, request: &RunRequest) -> Execution {
        let mut step = match self.sandboxed {
            Some(_) => Step::TrySandboxed,
            None => Step::TryDirect {
                fallback_reason: None,
            },
        };

        loop {
            step = match step {
                Step::TrySandboxed => self.try_sandboxed(request).await,
                Step::TryDirect { fallback_reason } => {
                    let outcome = self.direct.run(request).await;
                    Step::Done(Execution {
                        strategy: self.direct.strategy(),
                        outcome,
                        fallback_reason,
                    })
                }
                Step::Done(execution) => return execution,
            };
        }
    }

    async fn try_sandboxed(&self, request: &RunRequest) -> Step {
        let Some(sandboxed) = &self.sandboxed else {
            return Step::TryDirect {
                fallback_reason: None,
            };
        };

        match sandboxed.run(request).await {
            RunOutcome::EnvironmentUnavailable { reason } => {
                tracing::warn!(
                    job_id = %request.job_id,
                    reason = %reason,
                    "Sandbox unavailable, falling back to direct runner",
                );
                Step::TryDirect {
                    fallback_reason: Some(reason),
                }
            }
            outcome => Step::Done(Execution {
                strategy: sandboxed.strategy(),
                outcome,
                fallback_reason: None,
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use assert_matches::assert_matches;
    use async_trait::async_trait;

    use super::*;
    use crate::scanning::executor::CapturedOutput;

    /// Runner that returns a fixed outcome and counts invocations.
    struct FixedRunner {
        strategy: Strategy,
        outcome: RunOutcome,
        calls: AtomicUsize,
    }

    impl FixedRunner {
        fn new(strategy: Strategy, outcome: RunOutcome) -> Arc<Self> {
            Arc::new(Self {
                strategy,
                outcome,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ScanRunner for FixedRunner {
        fn strategy(&self) -> Strategy {
            self.strategy
        }

        async fn run(&self, _request: &RunRequest) -> RunOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.outcome.clone()
        }
    }

    fn request() -> RunRequest {
        RunRequest {
            job_id: uuid::Uuid::new_v4(),
            workspace: "/tmp/scans/job".into(),
        }
    }

    fn success(stdout: &str) -> RunOutcome {
        RunOutcome::Success(CapturedOutput {
            stdout: stdout.to_string(),
            ..CapturedOutput::default()
        })
    }

    fn env_unavailable() -> RunOutcome {
        RunOutcome::EnvironmentUnavailable {
            reason: "docker not found".to_string(),
        }
    }

    fn logic_failure() -> RunOutcome {
        RunOutcome::ScanLogicFailure {
            exit_code: Some(1),
            output: CapturedOutput::default(),
        }
    }

    fn controller(sandboxed: &Arc<FixedRunner>, direct: &Arc<FixedRunner>) -> FallbackController {
        let sandboxed: Arc<dyn ScanRunner> = sandboxed.clone();
        let direct: Arc<dyn ScanRunner> = direct.clone();
        FallbackController::new(Some(sandboxed), direct)
    }

    #[tokio::test]
    async fn sandbox_success_skips_direct() {
        let sandboxed = FixedRunner::new(Strategy::Sandboxed, success("sandbox"));
        let direct = FixedRunner::new(Strategy::Direct, success("direct"));

        let execution = controller(&sandboxed, &direct).execute(&request()).await;

        assert_eq!(execution.strategy, Strategy::Sandboxed);
        assert!(execution.is_success());
        assert!(execution.fallback_reason.is_none());
        assert_eq!((sandboxed.calls(), direct.calls()), (1, 0));
    }

    #[tokio::test]
    async fn environment_failure_falls_back_to_direct() {
        let sandboxed = FixedRunner::new(Strategy::Sandboxed, env_unavailable());
        let direct = FixedRunner::new(Strategy::Direct, success("direct"));

        let execution = controller(&sandboxed, &direct).execute(&request()).await;

        assert_eq!(execution.strategy, Strategy::Direct);
        assert_matches!(&execution.outcome, RunOutcome::Success(out) if out.stdout == "direct");
        assert_eq!(execution.fallback_reason.as_deref(), Some("docker not found"));
        assert_eq!((sandboxed.calls(), direct.calls()), (1, 1));
    }

    #[tokio::test]
    async fn direct_outcome_decides_after_fallback() {
        let sandboxed = FixedRunner::new(Strategy::Sandboxed, env_unavailable());
        let direct = FixedRunner::new(Strategy::Direct, logic_failure());

        let execution = controller(&sandboxed, &direct).execute(&request()).await;

        assert_eq!(execution.strategy, Strategy::Direct);
        assert_matches!(
            execution.outcome,
            RunOutcome::ScanLogicFailure { exit_code: Some(1), .. }
        );
    }

    #[tokio::test]
    async fn both_environments_unavailable_is_terminal_failure() {
        let sandboxed = FixedRunner::new(Strategy::Sandboxed, env_unavailable());
        let direct = FixedRunner::new(
            Strategy::Direct,
            RunOutcome::EnvironmentUnavailable {
                reason: "interpreter not found".to_string(),
            },
        );

        let execution = controller(&sandboxed, &direct).execute(&request()).await;

        assert!(!execution.is_success());
        assert_eq!(execution.strategy, Strategy::Direct);
        assert_eq!((sandboxed.calls(), direct.calls()), (1, 1));
    }

    #[tokio::test]
    async fn scan_logic_failure_never_falls_back() {
        let sandboxed = FixedRunner::new(Strategy::Sandboxed, logic_failure());
        let direct = FixedRunner::new(Strategy::Direct, success("direct"));

        let execution = controller(&sandboxed, &direct).execute(&request()).await;

        assert_eq!(execution.strategy, Strategy::Sandboxed);
        assert!(!execution.is_success());
        assert_eq!(direct.calls(), 0, "direct runner must not run after a logic failure");
    }

    #[tokio::test]
    async fn timeout_never_falls_back() {
        let sandboxed = FixedRunner::new(
            Strategy::Sandboxed,
            RunOutcome::TimedOut {
                elapsed_ms: 10,
                output: CapturedOutput::default(),
            },
        );
        let direct = FixedRunner::new(Strategy::Direct, success("direct"));

        let execution = controller(&sandboxed, &direct).execute(&request()).await;

        assert_matches!(execution.outcome, RunOutcome::TimedOut { .. });
        assert_eq!(direct.calls(), 0);
    }

    #[tokio::test]
    async fn disabled_sandbox_starts_with_direct() {
        let direct = FixedRunner::new(Strategy::Direct, success("direct"));
        let direct_dyn: Arc<dyn ScanRunner> = direct.clone();
        let controller = FallbackController::new(None, direct_dyn);

        let execution = controller.execute(&request()).await;

        assert_eq!(execution.strategy, Strategy::Direct);
        assert!(execution.fallback_reason.is_none());
        assert_eq!(direct.calls(), 1);
    }
}
