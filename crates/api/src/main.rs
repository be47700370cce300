use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use scanguard_core::registry::{InMemoryJobRegistry, JobRegistry};
use scanguard_core::workspace::WorkspaceManager;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use scanguard_api::background::workspace_retention;
use scanguard_api::config::ServerConfig;
use scanguard_api::engine::dispatcher::{self, JobDispatcher};
use scanguard_api::router::build_app_router;
use scanguard_api::scanning::{self, orchestrator::ScanOrchestrator};
use scanguard_api::state::AppState;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    init_tracing();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(
        host = %config.host,
        port = %config.port,
        scans_dir = %config.scan.scans_dir.display(),
        sandbox_enabled = config.scan.sandbox_enabled,
        "Loaded server configuration",
    );

    // --- Workspaces ---
    tokio::fs::create_dir_all(&config.scan.scans_dir)
        .await
        .expect("Failed to create scans directory");
    let workspaces = Arc::new(WorkspaceManager::new(config.scan.scans_dir.clone()));

    // --- Job registry ---
    let registry: Arc<dyn JobRegistry> = Arc::new(InMemoryJobRegistry::new());

    // --- Scan dispatcher ---
    let orchestrator = Arc::new(ScanOrchestrator::new(
        Arc::clone(&registry),
        Arc::clone(&workspaces),
        scanning::build_controller(&config.scan),
        config.scan.max_capture_bytes,
    ));
    let (queue, rx) = dispatcher::channel(config.scan.queue_capacity);
    let dispatcher_cancel = CancellationToken::new();
    let dispatcher_handle = tokio::spawn(
        JobDispatcher::new(
            rx,
            orchestrator,
            Arc::clone(&registry),
            config.scan.max_concurrent_scans,
        )
        .run(dispatcher_cancel.clone()),
    );

    // --- Workspace retention ---
    let retention_cancel = CancellationToken::new();
    let retention_handle = if config.scan.retention_hours > 0 {
        Some(tokio::spawn(workspace_retention::run(
            Arc::clone(&registry),
            Arc::clone(&workspaces),
            Duration::from_secs(config.scan.retention_hours * 3600),
            Duration::from_secs(config.scan.retention_sweep_secs.max(1)),
            retention_cancel.clone(),
        )))
    } else {
        tracing::info!("Workspace retention disabled");
        None
    };

    // --- App state ---
    let state = AppState {
        config: Arc::new(config.clone()),
        registry,
        workspaces,
        queue,
    };

    // --- Router ---
    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    retention_cancel.cancel();
    if let Some(handle) = retention_handle {
        let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
    }

    // Give in-flight scans a bounded window to finish.
    dispatcher_cancel.cancel();
    let grace = Duration::from_secs(config.shutdown_timeout_secs);
    if tokio::time::timeout(grace, dispatcher_handle).await.is_err() {
        tracing::warn!(
            timeout_secs = config.shutdown_timeout_secs,
            "In-flight scans did not finish before the shutdown timeout",
        );
    }

    tracing::info!("Graceful shutdown complete");
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` controls filtering; `LOG_FORMAT=json` switches to structured
/// JSON lines.
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "scanguard_api=debug,scanguard_core=debug,tower_http=debug".into()
    });
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix) so the server
/// shuts down cleanly whether stopped interactively or by a process
/// manager (e.g. systemd, Docker, Kubernetes).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
