use std::sync::Arc;

use scanguard_core::registry::JobRegistry;
use scanguard_core::workspace::WorkspaceManager;

use crate::config::ServerConfig;
use crate::engine::dispatcher::JobQueue;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc` or is already `Clone`).
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Job lifecycle records.
    pub registry: Arc<dyn JobRegistry>,
    /// Per-job workspace directories.
    pub workspaces: Arc<WorkspaceManager>,
    /// Queue feeding the background scan dispatcher.
    pub queue: JobQueue,
}
