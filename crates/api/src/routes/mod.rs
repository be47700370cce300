pub mod health;
pub mod scan;

use axum::Router;

use crate::state::AppState;

/// Build the `/api` route tree.
///
/// ```text
/// /scan                       POST  submit a URL list
/// /scan/{job_id}/progress     GET   job status
/// /scan/{job_id}/report       GET   normalized CSV (completed jobs only)
/// /scan/{job_id}/details      GET   status, report and screenshot summary
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new().nest("/scan", scan::router())
}
