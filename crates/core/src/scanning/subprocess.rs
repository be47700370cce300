//! Shared subprocess management for the scan runners.
//!
//! Provides [`run_command`], the spawn + drain + timeout logic used by both
//! runners. Each runner builds a [`tokio::process::Command`] for its
//! strategy and delegates here. Spawn failures are returned as
//! [`std::io::Error`] so the runner can classify them.

use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

use super::executor::CapturedOutput;

/// How long to keep draining pipes after a timed-out child was killed.
/// A grandchild that inherited the pipes could otherwise hold them open.
const POST_KILL_DRAIN: Duration = Duration::from_secs(2);

/// Read buffer size for output streams.
const CHUNK_SIZE: usize = 8 * 1024;

/// Execution limits applied to every scanner process.
#[derive(Debug, Clone, Copy)]
pub struct CaptureLimits {
    /// Maximum wall-clock time before the process is killed.
    pub timeout: Duration,
    /// Maximum bytes kept per output stream; the rest is drained and dropped.
    pub max_capture_bytes: usize,
}

/// How a spawned process ended.
#[derive(Debug)]
pub enum ProcessResult {
    /// The process exited on its own. `exit_code` is `None` when it was
    /// terminated by a signal.
    Exited {
        exit_code: Option<i32>,
        output: CapturedOutput,
    },
    /// The timeout fired and the process was killed.
    TimedOut {
        elapsed_ms: u64,
        output: CapturedOutput,
    },
}

/// Spawn `cmd`, drain stdout/stderr concurrently into bounded buffers, and
/// enforce the configured timeout.
///
/// The caller sets the program, arguments, and working directory. Stdin is
/// closed. Returns `Err` only when the process could not be spawned.
pub async fn run_command(
    cmd: &mut Command,
    limits: &CaptureLimits,
) -> Result<ProcessResult, std::io::Error> {
    // `kill_on_drop(true)` ensures the child is killed when dropped (e.g. on timeout).
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let start = Instant::now();
    let mut child = cmd.spawn()?;

    // Drain both pipes in their own tasks so a chatty process never blocks
    // on a full pipe while we wait for it.
    let cap = limits.max_capture_bytes;
    let stdout_handle = child.stdout.take();
    let stderr_handle = child.stderr.take();
    let stdout_task = tokio::spawn(async move { read_stream(stdout_handle, cap, "stdout").await });
    let stderr_task = tokio::spawn(async move { read_stream(stderr_handle, cap, "stderr").await });

    let wait_result = tokio::time::timeout(limits.timeout, child.wait()).await;

    match wait_result {
        Ok(Ok(status)) => {
            let stdout = stdout_task.await.unwrap_or_default();
            let stderr = stderr_task.await.unwrap_or_default();
            Ok(ProcessResult::Exited {
                exit_code: status.code(),
                output: CapturedOutput {
                    stdout,
                    stderr,
                    duration_ms: start.elapsed().as_millis() as u64,
                },
            })
        }
        Ok(Err(e)) => Err(e),
        Err(_elapsed) => {
            // Kill explicitly and reap so the pipes close before draining.
            let _ = child.kill().await;
            drop(child);
            let elapsed_ms = start.elapsed().as_millis() as u64;

            let stdout = tokio::time::timeout(POST_KILL_DRAIN, stdout_task)
                .await
                .ok()
                .and_then(Result::ok)
                .unwrap_or_default();
            let stderr = tokio::time::timeout(POST_KILL_DRAIN, stderr_task)
                .await
                .ok()
                .and_then(Result::ok)
                .unwrap_or_default();

            Ok(ProcessResult::TimedOut {
                elapsed_ms,
                output: CapturedOutput {
                    stdout,
                    stderr,
                    duration_ms: elapsed_ms,
                },
            })
        }
    }
}

/// Drain a stream to EOF, keeping at most `cap` bytes. Dropped bytes are
/// reported with a trailing `[truncated N bytes]` marker.
async fn read_stream<R: AsyncRead + Unpin>(
    handle: Option<R>,
    cap: usize,
    stream: &'static str,
) -> String {
    let mut kept = Vec::new();
    let mut dropped: u64 = 0;

    if let Some(mut h) = handle {
        let mut chunk = vec![0u8; CHUNK_SIZE];
        loop {
            match h.read(&mut chunk).await {
                Ok(0) => break,
                Ok(n) => {
                    let take = cap.saturating_sub(kept.len()).min(n);
                    kept.extend_from_slice(&chunk[..take]);
                    dropped += (n - take) as u64;
                    tracing::trace!(stream, bytes = n, "Scanner output");
                }
                Err(e) => {
                    tracing::debug!(stream, error = %e, "Stopped reading scanner output");
                    break;
                }
            }
        }
    }

    let mut text = String::from_utf8_lossy(&kept).into_owned();
    if dropped > 0 {
        text.push_str(&truncation_marker(dropped));
    }
    text
}

fn truncation_marker(dropped: u64) -> String {
    format!("\n[truncated {dropped} bytes]")
}

/// Cut `text` to at most `max_bytes` (on a char boundary), appending the
/// truncation marker when anything was removed.
pub fn truncate_diagnostic(text: &str, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text.to_string();
    }
    let mut end = max_bytes;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    let mut out = text[..end].to_string();
    out.push_str(&truncation_marker((text.len() - end) as u64));
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
