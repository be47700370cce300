//! Container-isolated scanner runner.
//!
//! Runs the scanner image through the Docker CLI with the job workspace
//! bind-mounted read-write and used as the working directory:
//!
//! ```text
//! docker run --rm --name scan-{job_id} -v {workspace}:{mount} -w {mount} \
//!     {image} {python} {container_script} urls.txt
//! ```
//!
//! `docker run` reports its own failures through reserved exit codes, which
//! lets us tell an unusable runtime apart from a scanner that ran and failed.
//! 125 always comes from docker. 126 and 127 are also what a shell inside
//! the container returns, so those count as environment failures only when
//! docker's own error text is on stderr.

use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use super::executor::{CapturedOutput, RunOutcome, RunRequest, ScanRunner, Strategy};
use super::subprocess::{self, CaptureLimits, ProcessResult};
use crate::workspace::INPUT_FILE_NAME;

/// `docker run` exit code for its own failures (daemon error, image missing,
/// bad options).
const DOCKER_ERROR_EXIT_CODE: i32 = 125;

/// Exit codes docker uses when the entry command cannot be invoked (126) or
/// found (127). A scanner can exit with these too.
const ENTRY_COMMAND_EXIT_CODES: &[i32] = &[126, 127];

/// Stderr markers written by docker itself rather than by the scanner.
const DOCKER_STDERR_MARKERS: &[&str] = &["Error response from daemon", "OCI runtime"];

/// Upper bound for the best-effort `docker rm -f` after a timeout.
const CONTAINER_CLEANUP_TIMEOUT: Duration = Duration::from_secs(10);

/// Settings for the sandboxed runner.
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    /// Docker CLI executable.
    pub docker_bin: String,
    /// Scanner image reference.
    pub image: String,
    /// Interpreter inside the image.
    pub container_python: String,
    /// Scanner script path inside the image.
    pub container_script: String,
    /// Where the workspace is mounted inside the container.
    pub mount_point: String,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            docker_bin: "docker".to_string(),
            image: "attribution-guard-scanner:latest".to_string(),
            container_python: "python".to_string(),
            container_script: "/app/cookie_stuffing_scanner.py".to_string(),
            mount_point: "/app/scan".to_string(),
        }
    }
}

/// Runner that executes the scanner inside a container.
pub struct SandboxedRunner {
    config: SandboxConfig,
    limits: CaptureLimits,
}

impl SandboxedRunner {
    pub fn new(config: SandboxConfig, limits: CaptureLimits) -> Self {
        Self { config, limits }
    }

    fn container_name(request: &RunRequest) -> String {
        format!("scan-{}", request.job_id)
    }

    /// Build the `docker run` argument list for a workspace at `host_dir`.
    pub fn docker_args(&self, request: &RunRequest, host_dir: &str) -> Vec<String> {
        let mount = &self.config.mount_point;
        vec![
            "run".to_string(),
            "--rm".to_string(),
            "--name".to_string(),
            Self::container_name(request),
            "-v".to_string(),
            format!("{host_dir}:{mount}"),
            "-w".to_string(),
            mount.clone(),
            self.config.image.clone(),
            self.config.container_python.clone(),
            self.config.container_script.clone(),
            INPUT_FILE_NAME.to_string(),
        ]
    }

    /// Force-remove the job's container after a timeout. Killing the CLI
    /// process does not stop the container itself.
    async fn remove_container(&self, request: &RunRequest) {
        let name = Self::container_name(request);
        let cleanup = Command::new(&self.config.docker_bin)
            .args(["rm", "-f", name.as_str()])
            .kill_on_drop(true)
            .output();

        match tokio::time::timeout(CONTAINER_CLEANUP_TIMEOUT, cleanup).await {
            Ok(Ok(out)) if out.status.success() => {
                tracing::info!(job_id = %request.job_id, container = %name, "Removed timed-out container");
            }
            Ok(Ok(out)) => {
                tracing::warn!(
                    job_id = %request.job_id,
                    container = %name,
                    stderr = %String::from_utf8_lossy(&out.stderr).trim(),
                    "Container removal failed",
                );
            }
            Ok(Err(e)) => {
                tracing::warn!(job_id = %request.job_id, error = %e, "Could not run container removal");
            }
            Err(_) => {
                tracing::warn!(job_id = %request.job_id, container = %name, "Container removal timed out");
            }
        }
    }
}

fn is_docker_failure(code: i32, stderr: &str) -> bool {
    code == DOCKER_ERROR_EXIT_CODE
        || (ENTRY_COMMAND_EXIT_CODES.contains(&code)
            && DOCKER_STDERR_MARKERS.iter().any(|m| stderr.contains(m)))
}

/// Classify how `docker run` ended.
fn classify_exit(exit_code: Option<i32>, output: CapturedOutput) -> RunOutcome {
    match exit_code {
        Some(0) => RunOutcome::Success(output),
        Some(code) if is_docker_failure(code, &output.stderr) => {
            let detail = output.stderr.trim();
            RunOutcome::EnvironmentUnavailable {
                reason: if detail.is_empty() {
                    format!("docker run exited with code {code}")
                } else {
                    format!("docker run exited with code {code}: {detail}")
                },
            }
        }
        other => RunOutcome::ScanLogicFailure {
            exit_code: other,
            output,
        },
    }
}

#[async_trait]
impl ScanRunner for SandboxedRunner {
    fn strategy(&self) -> Strategy {
        Strategy::Sandboxed
    }

    async fn run(&self, request: &RunRequest) -> RunOutcome {
        // Bind mounts need an absolute host path.
        let host_dir = match tokio::fs::canonicalize(&request.workspace).await {
            Ok(path) => path.to_string_lossy().into_owned(),
            Err(e) => {
                return RunOutcome::EnvironmentUnavailable {
                    reason: format!(
                        "cannot resolve workspace {}: {e}",
                        request.workspace.display()
                    ),
                };
            }
        };

        let mut cmd = Command::new(&self.config.docker_bin);
        cmd.args(self.docker_args(request, &host_dir));

        tracing::debug!(
            job_id = %request.job_id,
            image = %self.config.image,
            "Starting sandboxed scan",
        );

        match subprocess::run_command(&mut cmd, &self.limits).await {
            Err(e) => RunOutcome::EnvironmentUnavailable {
                reason: format!("failed to start {}: {e}", self.config.docker_bin),
            },
            Ok(ProcessResult::Exited { exit_code, output }) => classify_exit(exit_code, output),
            Ok(ProcessResult::TimedOut { elapsed_ms, output }) => {
                self.remove_container(request).await;
                RunOutcome::TimedOut { elapsed_ms, output }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
