pub mod orchestrator;

use std::sync::Arc;

use scanguard_core::scanning::direct::DirectRunner;
use scanguard_core::scanning::executor::ScanRunner;
use scanguard_core::scanning::fallback::FallbackController;
use scanguard_core::scanning::sandboxed::SandboxedRunner;

use crate::config::ScanConfig;

/// Build the production fallback controller from configuration.
///
/// The sandboxed runner is only wired in when `SANDBOX_ENABLED` is set.
pub fn build_controller(config: &ScanConfig) -> FallbackController {
    let limits = config.capture_limits();

    let sandboxed: Option<Arc<dyn ScanRunner>> = if config.sandbox_enabled {
        Some(Arc::new(SandboxedRunner::new(config.sandbox.clone(), limits)))
    } else {
        tracing::info!("Sandboxed execution disabled; scans run directly");
        None
    };
    let direct: Arc<dyn ScanRunner> = Arc::new(DirectRunner::new(config.direct.clone(), limits));

    FallbackController::new(sandboxed, direct)
}
