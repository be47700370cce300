//! Direct scanner runner using a local Python interpreter.
//!
//! Used when the container runtime is unavailable. Before each run the
//! scanner script (and its `requirements.txt`, when present) is staged into
//! the workspace with copy-if-missing semantics, then executed as
//! `{interpreter} {script} urls.txt` from inside the workspace.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::process::Command;

use super::executor::{RunOutcome, RunRequest, ScanRunner, Strategy};
use super::subprocess::{self, CaptureLimits, ProcessResult};
use crate::workspace::INPUT_FILE_NAME;

/// Settings for the direct runner.
#[derive(Debug, Clone)]
pub struct DirectConfig {
    /// Interpreter: either a path (e.g. `./venv/bin/python`) or a command
    /// name resolved through `PATH` (e.g. `python3`).
    pub interpreter: String,
    /// Scanner script to stage into each workspace.
    pub script_source: PathBuf,
    /// Dependency manifest staged alongside the script, if it exists.
    pub requirements_source: Option<PathBuf>,
}

impl DirectConfig {
    /// Make relative paths absolute against `base`. The runner spawns from
    /// inside the job workspace, so a relative path would otherwise resolve
    /// there. A bare interpreter name is kept for `PATH` lookup.
    pub fn anchored_at(mut self, base: &Path) -> Self {
        let interpreter = Path::new(&self.interpreter);
        if interpreter.components().count() > 1 && interpreter.is_relative() {
            self.interpreter = base.join(interpreter).to_string_lossy().into_owned();
        }
        if self.script_source.is_relative() {
            self.script_source = base.join(&self.script_source);
        }
        if let Some(requirements) = self.requirements_source.take() {
            self.requirements_source = Some(if requirements.is_relative() {
                base.join(requirements)
            } else {
                requirements
            });
        }
        self
    }
}

/// Runner that executes the scanner directly on the host.
pub struct DirectRunner {
    config: DirectConfig,
    limits: CaptureLimits,
}

/// Result of staging one file into a workspace.
#[derive(Debug, PartialEq, Eq)]
pub enum StageResult {
    Copied,
    AlreadyPresent,
}

/// Copy `src` to `dst` unless `dst` already exists. The destination is
/// opened with `create_new`, so an existing copy is never overwritten.
pub async fn copy_if_missing(src: &Path, dst: &Path) -> std::io::Result<StageResult> {
    let mut target = match fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(dst)
        .await
    {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(StageResult::AlreadyPresent),
        Err(e) => return Err(e),
    };

    let copy = async {
        let mut source = fs::File::open(src).await?;
        tokio::io::copy(&mut source, &mut target).await?;
        target.sync_all().await
    };
    if let Err(e) = copy.await {
        // Don't leave a truncated copy behind for the next attempt to skip.
        let _ = fs::remove_file(dst).await;
        return Err(e);
    }
    Ok(StageResult::Copied)
}

impl DirectRunner {
    /// Create a runner, anchoring relative paths at the process working
    /// directory.
    pub fn new(config: DirectConfig, limits: CaptureLimits) -> Self {
        let config = match std::env::current_dir() {
            Ok(cwd) => config.anchored_at(&cwd),
            Err(e) => {
                tracing::warn!(error = %e, "Cannot read working directory, keeping scanner paths as given");
                config
            }
        };
        Self { config, limits }
    }

    fn script_file_name(&self) -> Result<&std::ffi::OsStr, String> {
        self.config.script_source.file_name().ok_or_else(|| {
            format!(
                "scanner script path {} has no file name",
                self.config.script_source.display()
            )
        })
    }

    /// Check that the interpreter and script exist. A bare command name is
    /// left to the spawn to resolve.
    async fn check_environment(&self) -> Result<(), String> {
        let interpreter = Path::new(&self.config.interpreter);
        if interpreter.components().count() > 1 && fs::metadata(interpreter).await.is_err() {
            return Err(format!("interpreter not found: {}", self.config.interpreter));
        }

        match fs::metadata(&self.config.script_source).await {
            Ok(meta) if meta.is_file() => Ok(()),
            _ => Err(format!(
                "scanner script not found: {}",
                self.config.script_source.display()
            )),
        }
    }

    /// Stage the script and, if present, the requirements manifest.
    async fn stage(&self, workspace: &Path) -> Result<(), String> {
        let script_name = self.script_file_name()?;
        copy_if_missing(&self.config.script_source, &workspace.join(script_name))
            .await
            .map_err(|e| format!("failed to stage scanner script: {e}"))?;

        if let Some(requirements) = &self.config.requirements_source {
            let present = fs::metadata(requirements).await.is_ok();
            if let (true, Some(name)) = (present, requirements.file_name()) {
                copy_if_missing(requirements, &workspace.join(name))
                    .await
                    .map_err(|e| format!("failed to stage requirements: {e}"))?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ScanRunner for DirectRunner {
    fn strategy(&self) -> Strategy {
        Strategy::Direct
    }

    async fn run(&self, request: &RunRequest) -> RunOutcome {
        if let Err(reason) = self.check_environment().await {
            return RunOutcome::EnvironmentUnavailable { reason };
        }
        if let Err(reason) = self.stage(&request.workspace).await {
            return RunOutcome::EnvironmentUnavailable { reason };
        }
        let script_name = match self.script_file_name() {
            Ok(name) => name.to_owned(),
            Err(reason) => return RunOutcome::EnvironmentUnavailable { reason },
        };

        let mut cmd = Command::new(&self.config.interpreter);
        cmd.arg(script_name)
            .arg(INPUT_FILE_NAME)
            .current_dir(&request.workspace)
            .env("PYTHONUNBUFFERED", "1");

        tracing::debug!(
            job_id = %request.job_id,
            interpreter = %self.config.interpreter,
            "Starting direct scan",
        );

        match subprocess::run_command(&mut cmd, &self.limits).await {
            Err(e) => RunOutcome::EnvironmentUnavailable {
                reason: format!("failed to start {}: {e}", self.config.interpreter),
            },
            Ok(ProcessResult::Exited {
                exit_code: Some(0),
                output,
            }) => RunOutcome::Success(output),
            Ok(ProcessResult::Exited { exit_code, output }) => {
                RunOutcome::ScanLogicFailure { exit_code, output }
            }
            Ok(ProcessResult::TimedOut { elapsed_ms, output }) => {
                RunOutcome::TimedOut { elapsed_ms, output }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
