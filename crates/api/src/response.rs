//! Response payloads for the scan API.
//!
//! Field names are camelCase on the wire (`jobId`, `reportUrl`) to match
//! the browser client.

use scanguard_core::status::JobStatus;
use scanguard_core::types::JobId;
use serde::Serialize;

/// Message returned when a scan is accepted.
pub const SCAN_INITIATED: &str = "Scan initiated";

/// Body of `POST /api/scan`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitScanResponse {
    pub job_id: JobId,
    pub message: &'static str,
    /// Relative URL the report can be downloaded from once completed.
    pub report_url: String,
}

impl SubmitScanResponse {
    pub fn new(job_id: JobId) -> Self {
        Self {
            job_id,
            message: SCAN_INITIATED,
            report_url: report_url(job_id),
        }
    }
}

/// Body of `GET /api/scan/{id}/progress`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressResponse {
    pub job_id: JobId,
    pub status: JobStatus,
}

/// Body of `GET /api/scan/{id}/details`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailsResponse {
    pub job_id: JobId,
    pub status: JobStatus,
    pub has_report: bool,
    pub screenshot_count: usize,
}

/// Relative download URL of a job's report.
pub fn report_url(job_id: JobId) -> String {
    format!("/api/scan/{job_id}/report")
}

/// File name offered in the report's `Content-Disposition` header.
pub fn report_file_name(job_id: JobId) -> String {
    format!("scan_report_{job_id}.csv")
}
