use axum::routing::{get, post};
use axum::Router;

use crate::handlers::scan;
use crate::state::AppState;

/// Scan job routes, nested under `/api/scan`.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(scan::submit_scan))
        .route("/{job_id}/progress", get(scan::get_progress))
        .route("/{job_id}/report", get(scan::download_report))
        .route("/{job_id}/details", get(scan::get_details))
}
