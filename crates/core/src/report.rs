//! Raw scanner report → normalized client report.
//!
//! The scanner writes one row per detection as
//! `kind,url,detail,origin,referer` after a header line. Clients get a
//! stable schema instead:
//!
//! ```text
//! URL,Status,Risk Level,Attribution Chain
//! https://a.com,Suspicious,High,Detected iframe tracking
//! ```
//!
//! The scanner only reports detections, so every row is `Suspicious`. A
//! missing raw report means zero detections and yields a header-only file.

use std::io::ErrorKind;
use std::path::Path;

use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::error::CoreError;

/// Header line of the normalized report.
pub const NORMALIZED_HEADER: &str = "URL,Status,Risk Level,Attribution Chain";

/// Status label applied to every detection.
pub const STATUS_SUSPICIOUS: &str = "Suspicious";

/// Detection kind that is rated high risk.
const HIGH_RISK_KIND: &str = "iframe";

/// Minimum comma-separated fields for a raw row to be considered.
const MIN_RAW_FIELDS: usize = 3;

/// Risk level for a detection kind.
pub fn risk_level(kind: &str) -> &'static str {
    if kind == HIGH_RISK_KIND {
        "High"
    } else {
        "Medium"
    }
}

/// Convert one raw line into a normalized row, or `None` if it is blank or
/// has fewer than three fields.
fn normalize_line(line: &str) -> Option<String> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let fields: Vec<&str> = line.split(',').collect();
    if fields.len() < MIN_RAW_FIELDS {
        return None;
    }

    let kind = fields[0];
    let url = fields[1];
    Some(format!(
        "{url},{STATUS_SUSPICIOUS},{},Detected {kind} tracking",
        risk_level(kind)
    ))
}

/// Normalize raw report text. The first line is the scanner's header and is
/// always skipped.
///
/// Returns the normalized document (every line `\n`-terminated) and the
/// number of detection rows it contains.
pub fn normalize_str(raw: &str) -> (String, usize) {
    let mut out = String::with_capacity(raw.len() + NORMALIZED_HEADER.len() + 1);
    out.push_str(NORMALIZED_HEADER);
    out.push('\n');

    let mut rows = 0;
    for row in raw.lines().skip(1).filter_map(normalize_line) {
        out.push_str(&row);
        out.push('\n');
        rows += 1;
    }
    (out, rows)
}

/// Read the raw report at `raw_path` and write the normalized report to
/// `normalized_path`.
///
/// A missing raw report is treated as zero detections. The output is written
/// to a temporary sibling, flushed, then renamed into place, so readers never
/// observe a partial report.
pub async fn normalize(raw_path: &Path, normalized_path: &Path) -> Result<usize, CoreError> {
    let raw = match fs::read(raw_path).await {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            tracing::debug!(path = %raw_path.display(), "No raw report; writing header-only report");
            String::new()
        }
        Err(e) => return Err(e.into()),
    };

    let (document, rows) = normalize_str(&raw);

    let tmp_path = normalized_path.with_extension("csv.tmp");
    let mut file = fs::File::create(&tmp_path).await?;
    file.write_all(document.as_bytes()).await?;
    file.sync_all().await?;
    drop(file);
    fs::rename(&tmp_path, normalized_path).await?;

    tracing::debug!(rows, path = %normalized_path.display(), "Report normalized");
    Ok(rows)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
