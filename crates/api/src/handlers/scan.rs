//! Handlers for scan submission, progress polling and report download.

use std::path::PathBuf;

use axum::body::Body;
use axum::extract::{Multipart, Path, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use scanguard_core::error::CoreError;
use scanguard_core::registry::{JobOutcome, JobRecord};
use scanguard_core::status::JobStatus;
use scanguard_core::types::JobId;
use scanguard_core::upload::validate_url_list;
use tokio_util::io::ReaderStream;

use crate::error::{AppError, AppResult};
use crate::response::{report_file_name, DetailsResponse, ProgressResponse, SubmitScanResponse};
use crate::state::AppState;

/// Multipart field carrying the URL list.
pub const UPLOAD_FIELD: &str = "file";

/// Parse a path id. Anything that is not a UUID cannot name a job, so it is
/// reported as not found rather than as a bad request.
fn parse_job_id(raw: &str) -> Result<JobId, AppError> {
    raw.parse::<JobId>()
        .map_err(|_| AppError::Core(CoreError::job_not_found(raw)))
}

struct Upload {
    file_name: Option<String>,
    content_type: Option<String>,
    bytes: axum::body::Bytes,
}

/// Pull the URL list field out of the multipart body, skipping other fields.
async fn read_upload(multipart: &mut Multipart, max_bytes: usize) -> AppResult<Upload> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let bytes = field.bytes().await.map_err(multipart_error)?;
        if bytes.len() > max_bytes {
            return Err(AppError::PayloadTooLarge(format!(
                "Uploaded file exceeds {max_bytes} bytes"
            )));
        }
        return Ok(Upload {
            file_name,
            content_type,
            bytes,
        });
    }
    Err(AppError::BadRequest("No file uploaded".to_string()))
}

fn multipart_error(e: axum::extract::multipart::MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge(e.body_text())
    } else {
        AppError::BadRequest(e.body_text())
    }
}

// ── Submit ───────────────────────────────────────────────────────────

/// Write the input file and register the job as `pending`.
async fn register(
    state: &AppState,
    job_id: JobId,
    workspace: PathBuf,
    bytes: &[u8],
) -> Result<(), CoreError> {
    state.workspaces.write_input(job_id, bytes).await?;
    state
        .registry
        .insert(JobRecord::pending(job_id, workspace))
        .await
}

/// POST /api/scan
///
/// Accept a URL list, create the job workspace, register the job as
/// `pending` and queue it. Returns without waiting for the scan.
pub async fn submit_scan(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> AppResult<Json<SubmitScanResponse>> {
    let upload = read_upload(&mut multipart, state.config.max_upload_bytes).await?;
    let url_count = validate_url_list(
        upload.file_name.as_deref(),
        upload.content_type.as_deref(),
        &upload.bytes,
    )?;

    let job_id = uuid::Uuid::new_v4();
    let workspace = state.workspaces.create_workspace(job_id).await?;
    if let Err(e) = register(&state, job_id, workspace, &upload.bytes).await {
        // Nothing references the job yet; drop its directory.
        let _ = state.workspaces.remove_workspace(job_id).await;
        return Err(e.into());
    }

    if let Err(e) = state.queue.enqueue(job_id) {
        let reason = e.to_string();
        if let Err(finish_err) = state
            .registry
            .finish(job_id, JobOutcome::failed(reason.clone()))
            .await
        {
            tracing::error!(%job_id, error = %finish_err, "Failed to record dispatch failure");
        }
        return Err(AppError::InternalError(format!(
            "Failed to queue scan {job_id}: {reason}"
        )));
    }

    tracing::info!(
        %job_id,
        url_count,
        file_name = upload.file_name.as_deref().unwrap_or(""),
        "Scan submitted",
    );
    Ok(Json(SubmitScanResponse::new(job_id)))
}

// ── Progress ─────────────────────────────────────────────────────────

/// GET /api/scan/{job_id}/progress
pub async fn get_progress(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> AppResult<Json<ProgressResponse>> {
    let job_id = parse_job_id(&job_id)?;
    let status = state.registry.status(job_id).await?;
    Ok(Json(ProgressResponse { job_id, status }))
}

// ── Report ───────────────────────────────────────────────────────────

/// GET /api/scan/{job_id}/report
///
/// Streams the normalized CSV. The report is only served once the job is
/// `completed`, even if a file happens to exist earlier.
pub async fn download_report(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let job_id = parse_job_id(&job_id)?;
    let status = state.registry.status(job_id).await?;
    if status != JobStatus::Completed {
        return Err(AppError::Core(CoreError::InvalidState { status }));
    }

    let path = state.workspaces.normalized_report_path(job_id);
    let file = match tokio::fs::File::open(&path).await {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!(%job_id, "Completed job has no report file");
            return Err(AppError::Core(CoreError::NotFound {
                entity: "Report",
                id: job_id.to_string(),
            }));
        }
        Err(e) => return Err(AppError::Core(e.into())),
    };

    let disposition = format!("attachment; filename=\"{}\"", report_file_name(job_id));
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/csv".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        Body::from_stream(ReaderStream::new(file)),
    ))
}

// ── Details ──────────────────────────────────────────────────────────

/// GET /api/scan/{job_id}/details
pub async fn get_details(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> AppResult<Json<DetailsResponse>> {
    let job_id = parse_job_id(&job_id)?;
    let status = state.registry.status(job_id).await?;

    let has_report = state.workspaces.has_report(job_id).await;
    let screenshot_count = state.workspaces.screenshot_count(job_id).await?;

    Ok(Json(DetailsResponse {
        job_id,
        status,
        has_report,
        screenshot_count,
    }))
}
