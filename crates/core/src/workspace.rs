//! On-disk workspaces for scan jobs.
//!
//! Every job owns one directory under the scans root:
//!
//! ```text
//! {root}/{job_id}/urls.txt                     uploaded URL list
//! {root}/{job_id}/screenshots/*.png            capture artifacts
//! {root}/{job_id}/cookie_stuffing_report.csv   raw scanner output
//! {root}/{job_id}/report.csv                   normalized report
//! ```
//!
//! [`WorkspaceManager`] is the only component that computes these paths or
//! mutates the tree; runners and handlers ask it for paths.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::fs;

use crate::error::CoreError;
use crate::types::JobId;

/// File name of the uploaded URL list inside a workspace.
pub const INPUT_FILE_NAME: &str = "urls.txt";

/// Subdirectory the scanner writes screenshots into.
pub const SCREENSHOTS_DIR_NAME: &str = "screenshots";

/// File name the external scanner writes its raw detections to.
pub const RAW_REPORT_FILE_NAME: &str = "cookie_stuffing_report.csv";

/// Stable file name of the normalized, client-facing report.
pub const NORMALIZED_REPORT_FILE_NAME: &str = "report.csv";

/// Extension counted as a screenshot artifact.
const SCREENSHOT_EXTENSION: &str = "png";

/// Creates and addresses per-job workspace directories under a single root.
#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    root: PathBuf,
}

impl WorkspaceManager {
    /// Create a manager rooted at `root`. The directory is created lazily on
    /// the first [`create_workspace`](Self::create_workspace).
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The scans root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn dir(&self, job_id: JobId) -> PathBuf {
        self.root.join(job_id.to_string())
    }

    /// Create the workspace directory and its `screenshots/` subdirectory.
    ///
    /// Fails with [`CoreError::Conflict`] if the job directory already
    /// exists; an existing workspace is never reused or overwritten.
    pub async fn create_workspace(&self, job_id: JobId) -> Result<PathBuf, CoreError> {
        fs::create_dir_all(&self.root).await?;

        let dir = self.dir(job_id);
        match fs::create_dir(&dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(CoreError::Conflict(format!(
                    "Workspace for job {job_id} already exists at {}",
                    dir.display()
                )));
            }
            Err(e) => return Err(e.into()),
        }
        fs::create_dir(dir.join(SCREENSHOTS_DIR_NAME)).await?;

        tracing::debug!(job_id = %job_id, path = %dir.display(), "Workspace created");
        Ok(dir)
    }

    /// Resolve the workspace directory of an existing job.
    pub async fn workspace_path(&self, job_id: JobId) -> Result<PathBuf, CoreError> {
        let dir = self.dir(job_id);
        match fs::metadata(&dir).await {
            Ok(meta) if meta.is_dir() => Ok(dir),
            Ok(_) => Err(CoreError::job_not_found(job_id)),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(CoreError::job_not_found(job_id)),
            Err(e) => Err(e.into()),
        }
    }

    /// Write the uploaded URL list into the job's workspace.
    pub async fn write_input(&self, job_id: JobId, bytes: &[u8]) -> Result<PathBuf, CoreError> {
        self.workspace_path(job_id).await?;
        let path = self.input_path(job_id);
        fs::write(&path, bytes).await?;
        Ok(path)
    }

    /// Path of the uploaded URL list.
    pub fn input_path(&self, job_id: JobId) -> PathBuf {
        self.dir(job_id).join(INPUT_FILE_NAME)
    }

    /// Path of the scanner's raw report.
    pub fn raw_report_path(&self, job_id: JobId) -> PathBuf {
        self.dir(job_id).join(RAW_REPORT_FILE_NAME)
    }

    /// Path of the normalized report served to clients.
    pub fn normalized_report_path(&self, job_id: JobId) -> PathBuf {
        self.dir(job_id).join(NORMALIZED_REPORT_FILE_NAME)
    }

    /// Directory the scanner drops screenshots into.
    pub fn screenshots_dir(&self, job_id: JobId) -> PathBuf {
        self.dir(job_id).join(SCREENSHOTS_DIR_NAME)
    }

    /// Whether the normalized report exists on disk.
    pub async fn has_report(&self, job_id: JobId) -> bool {
        fs::metadata(self.normalized_report_path(job_id))
            .await
            .map(|m| m.is_file())
            .unwrap_or(false)
    }

    /// Count `*.png` files in the screenshots directory. A missing directory
    /// counts as zero.
    pub async fn screenshot_count(&self, job_id: JobId) -> Result<usize, CoreError> {
        let mut entries = match fs::read_dir(self.screenshots_dir(job_id)).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut count = 0;
        while let Some(entry) = entries.next_entry().await? {
            let is_png = entry
                .path()
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext == SCREENSHOT_EXTENSION);
            if is_png {
                count += 1;
            }
        }
        Ok(count)
    }

    /// Delete a job's workspace and everything in it. Missing workspaces are
    /// not an error.
    pub async fn remove_workspace(&self, job_id: JobId) -> Result<(), CoreError> {
        match fs::remove_dir_all(self.dir(job_id)).await {
            Ok(()) => {
                tracing::debug!(job_id = %job_id, "Workspace removed");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
