use axum::{routing::get, Json, Router};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{json, Value};

use crate::state::AppState;

/// Health check response payload.
#[derive(Serialize)]
pub struct HealthResponse {
    /// Overall service status.
    pub status: &'static str,
    /// Current server time, RFC 3339.
    pub timestamp: String,
    /// Crate version from Cargo.toml.
    pub version: &'static str,
}

/// GET /health -- liveness probe.
async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "OK",
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// GET / -- service description and endpoint index.
async fn index() -> Json<Value> {
    Json(json!({
        "message": "ScanGuard scan API",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "health": "GET /health",
            "submitScan": "POST /api/scan",
            "progress": "GET /api/scan/{jobId}/progress",
            "report": "GET /api/scan/{jobId}/report",
            "details": "GET /api/scan/{jobId}/details",
        },
    }))
}

/// Mount health and index routes (root-level, NOT under `/api`).
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health_check))
}
