#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use scanguard_api::config::{ScanConfig, ServerConfig};
use scanguard_api::engine::dispatcher::{self, JobDispatcher};
use scanguard_api::router::build_app_router;
use scanguard_api::scanning::orchestrator::ScanOrchestrator;
use scanguard_api::state::AppState;
use scanguard_core::registry::{InMemoryJobRegistry, JobRegistry};
use scanguard_core::scanning::direct::DirectConfig;
use scanguard_core::scanning::executor::{
    CapturedOutput, RunOutcome, RunRequest, ScanRunner, Strategy,
};
use scanguard_core::scanning::fallback::FallbackController;
use scanguard_core::scanning::sandboxed::SandboxConfig;
use scanguard_core::workspace::WorkspaceManager;

pub const BOUNDARY: &str = "scanguard-test-boundary";

pub const RAW_REPORT: &str = "type,url,detail,origin,referer\n\
iframe,https://a.com,x,y,z\n\
script,https://b.com,x,y,z\n";

pub const NORMALIZED_REPORT: &str = "URL,Status,Risk Level,Attribution Chain\n\
https://a.com,Suspicious,High,Detected iframe tracking\n\
https://b.com,Suspicious,Medium,Detected script tracking\n";

/// Build a test `ServerConfig` rooted at `scans_dir`.
///
/// Uses `http://localhost:5173` as CORS origin (matching the dev default)
/// and a 30-second request timeout.
pub fn test_config(scans_dir: &Path) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 5,
        max_upload_bytes: 1024 * 1024,
        scan: ScanConfig {
            scans_dir: scans_dir.to_path_buf(),
            sandbox_enabled: true,
            sandbox: SandboxConfig::default(),
            direct: DirectConfig {
                interpreter: "python3".to_string(),
                script_source: "cookie_stuffing_scanner.py".into(),
                requirements_source: None,
            },
            timeout_secs: 5,
            max_capture_bytes: 64 * 1024,
            max_concurrent_scans: 2,
            queue_capacity: 16,
            retention_hours: 0,
            retention_sweep_secs: 3600,
        },
    }
}

// ---------------------------------------------------------------------------
// Fake runners
// ---------------------------------------------------------------------------

/// What a [`FakeRunner`] does when invoked.
#[derive(Clone)]
pub enum Behaviour {
    /// Write the raw report plus `screenshots` PNG files, then succeed.
    Succeed { screenshots: usize },
    /// Return the given outcome without touching the workspace.
    Return(RunOutcome),
}

/// Scripted stand-in for the sandboxed or direct runner.
pub struct FakeRunner {
    strategy: Strategy,
    behaviour: Behaviour,
    calls: AtomicUsize,
    /// When set, `run` blocks until the gate is notified.
    gate: Option<Arc<Notify>>,
}

impl FakeRunner {
    pub fn new(strategy: Strategy, behaviour: Behaviour) -> Arc<Self> {
        Arc::new(Self {
            strategy,
            behaviour,
            calls: AtomicUsize::new(0),
            gate: None,
        })
    }

    pub fn gated(strategy: Strategy, behaviour: Behaviour, gate: Arc<Notify>) -> Arc<Self> {
        Arc::new(Self {
            strategy,
            behaviour,
            calls: AtomicUsize::new(0),
            gate: Some(gate),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ScanRunner for FakeRunner {
    fn strategy(&self) -> Strategy {
        self.strategy
    }

    async fn run(&self, request: &RunRequest) -> RunOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }

        match &self.behaviour {
            Behaviour::Succeed { screenshots } => {
                let dir = &request.workspace;
                tokio::fs::write(dir.join("cookie_stuffing_report.csv"), RAW_REPORT)
                    .await
                    .expect("write raw report");
                for i in 0..*screenshots {
                    tokio::fs::write(dir.join(format!("screenshots/shot_{i}.png")), b"png")
                        .await
                        .expect("write screenshot");
                }
                tokio::fs::write(dir.join("screenshots/notes.txt"), b"not a screenshot")
                    .await
                    .expect("write note");
                RunOutcome::Success(CapturedOutput {
                    stdout: "scan finished\n".to_string(),
                    ..CapturedOutput::default()
                })
            }
            Behaviour::Return(outcome) => outcome.clone(),
        }
    }
}

pub fn environment_unavailable() -> RunOutcome {
    RunOutcome::EnvironmentUnavailable {
        reason: "docker: command not found".to_string(),
    }
}

pub fn logic_failure() -> RunOutcome {
    RunOutcome::ScanLogicFailure {
        exit_code: Some(1),
        output: CapturedOutput {
            stderr: "Traceback (most recent call last)".to_string(),
            ..CapturedOutput::default()
        },
    }
}

// ---------------------------------------------------------------------------
// Test application
// ---------------------------------------------------------------------------

/// A running application: router, shared state and the dispatcher task.
pub struct TestApp {
    pub app: Router,
    pub state: AppState,
    cancel: CancellationToken,
    _tmp: tempfile::TempDir,
}

impl TestApp {
    pub fn scans_dir(&self) -> &Path {
        self.state.workspaces.root()
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Build the full application with the given runners, using the same
/// router builder and dispatcher as `main.rs`.
pub fn build_test_app(
    sandboxed: Option<Arc<FakeRunner>>,
    direct: Arc<FakeRunner>,
) -> TestApp {
    build_test_app_with(sandboxed, direct, |_| {})
}

/// Like [`build_test_app`] with a hook to adjust the configuration.
pub fn build_test_app_with(
    sandboxed: Option<Arc<FakeRunner>>,
    direct: Arc<FakeRunner>,
    customize: impl FnOnce(&mut ServerConfig),
) -> TestApp {
    let tmp = tempfile::tempdir().expect("create temp dir");
    let scans_dir = tmp.path().join("scans");
    std::fs::create_dir_all(&scans_dir).expect("create scans dir");

    let mut config = test_config(&scans_dir);
    customize(&mut config);

    let registry: Arc<dyn JobRegistry> = Arc::new(InMemoryJobRegistry::new());
    let workspaces = Arc::new(WorkspaceManager::new(scans_dir));

    let sandboxed = sandboxed.map(|r| r as Arc<dyn ScanRunner>);
    let controller = FallbackController::new(sandboxed, direct);
    let orchestrator = Arc::new(ScanOrchestrator::new(
        Arc::clone(&registry),
        Arc::clone(&workspaces),
        controller,
        config.scan.max_capture_bytes,
    ));

    let (queue, rx) = dispatcher::channel(config.scan.queue_capacity);
    let cancel = CancellationToken::new();
    tokio::spawn(
        JobDispatcher::new(
            rx,
            orchestrator,
            Arc::clone(&registry),
            config.scan.max_concurrent_scans,
        )
        .run(cancel.clone()),
    );

    let state = AppState {
        config: Arc::new(config.clone()),
        registry,
        workspaces,
        queue,
    };
    let app = build_app_router(state.clone(), &config);

    TestApp {
        app,
        state,
        cancel,
        _tmp: tmp,
    }
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

pub async fn get(app: &Router, uri: &str) -> Response<Body> {
    let request = Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("build request");
    app.clone().oneshot(request).await.expect("send request")
}

/// Build a `multipart/form-data` body with one file field.
pub fn multipart_body(field: &str, file_name: &str, content_type: &str, contents: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
    body.extend_from_slice(
        format!("Content-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\n")
            .as_bytes(),
    );
    body.extend_from_slice(format!("Content-Type: {content_type}\r\n\r\n").as_bytes());
    body.extend_from_slice(contents);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

pub async fn post_multipart(app: &Router, uri: &str, body: Vec<u8>) -> Response<Body> {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .expect("build request");
    app.clone().oneshot(request).await.expect("send request")
}

/// Upload `contents` as `urls.txt` to `POST /api/scan`.
pub async fn submit_urls(app: &Router, contents: &str) -> Response<Body> {
    post_multipart(
        app,
        "/api/scan",
        multipart_body("file", "urls.txt", "text/plain", contents.as_bytes()),
    )
    .await
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .expect("read body")
        .to_bytes()
        .to_vec()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).expect("parse JSON body")
}

/// Submit a URL list and return the new job id.
pub async fn submit_job(app: &Router) -> String {
    let response = submit_urls(app, "https://a.com\nhttps://b.com\n").await;
    assert_eq!(response.status(), 200);
    let json = body_json(response).await;
    json["jobId"].as_str().expect("jobId").to_string()
}

/// Poll the progress endpoint until the job reports `expected`.
pub async fn wait_for_status(app: &Router, job_id: &str, expected: &str) {
    let uri = format!("/api/scan/{job_id}/progress");
    let mut last = serde_json::Value::Null;
    for _ in 0..300 {
        let json = body_json(get(app, &uri).await).await;
        if json["status"] == expected {
            return;
        }
        last = json["status"].clone();
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {job_id} never reached {expected}; last status {last}");
}
