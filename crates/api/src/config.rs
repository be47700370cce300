use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use scanguard_core::scanning::direct::DirectConfig;
use scanguard_core::scanning::sandboxed::SandboxConfig;
use scanguard_core::scanning::subprocess::CaptureLimits;

/// Server configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development.
/// In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// How long in-flight scans get to finish after a shutdown signal (default: `30`).
    pub shutdown_timeout_secs: u64,
    /// Maximum accepted request body for uploads in bytes (default: 1 MiB).
    pub max_upload_bytes: usize,
    /// Scan execution settings.
    pub scan: ScanConfig,
}

/// Scan execution configuration: where workspaces live, how the scanner is
/// run, and how long finished jobs are kept.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Root directory for job workspaces.
    pub scans_dir: PathBuf,
    /// Whether to try the container runner before the direct runner.
    pub sandbox_enabled: bool,
    pub sandbox: SandboxConfig,
    pub direct: DirectConfig,
    /// Maximum execution time per scan in seconds.
    pub timeout_secs: u64,
    /// Maximum bytes kept per captured output stream.
    pub max_capture_bytes: usize,
    /// Scans allowed to run at the same time.
    pub max_concurrent_scans: usize,
    /// Submitted jobs that may wait for a free slot.
    pub queue_capacity: usize,
    /// Age after which finished jobs are deleted; `0` disables cleanup.
    pub retention_hours: u64,
    /// How often the retention sweeper runs, in seconds.
    pub retention_sweep_secs: u64,
}

/// Read `key` from the environment, falling back to `default`.
///
/// Panics with a descriptive message if the value does not parse; bad
/// configuration should stop the server at startup.
fn env_or<T>(key: &str, default: T) -> T
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .unwrap_or_else(|e| panic!("{key} has an invalid value '{raw}': {e}")),
        Err(_) => default,
    }
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                | Default                    |
    /// |------------------------|----------------------------|
    /// | `HOST`                 | `0.0.0.0`                  |
    /// | `PORT`                 | `3000`                     |
    /// | `CORS_ORIGINS`         | `http://localhost:5173`    |
    /// | `REQUEST_TIMEOUT_SECS` | `30`                       |
    /// | `SHUTDOWN_TIMEOUT_SECS`| `30`                       |
    /// | `MAX_UPLOAD_BYTES`     | `1048576`                  |
    ///
    /// Scan settings are documented on [`ScanConfig::from_env`].
    pub fn from_env() -> Self {
        let cors_origins: Vec<String> = env_string("CORS_ORIGINS", "http://localhost:5173")
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Self {
            host: env_string("HOST", "0.0.0.0"),
            port: env_or("PORT", 3000),
            cors_origins,
            request_timeout_secs: env_or("REQUEST_TIMEOUT_SECS", 30),
            shutdown_timeout_secs: env_or("SHUTDOWN_TIMEOUT_SECS", 30),
            max_upload_bytes: env_or("MAX_UPLOAD_BYTES", 1024 * 1024),
            scan: ScanConfig::from_env(),
        }
    }
}

impl ScanConfig {
    /// Load scan settings from environment variables with defaults.
    ///
    /// | Env Var                     | Default                              |
    /// |-----------------------------|--------------------------------------|
    /// | `SCANS_DIR`                 | `./scans`                            |
    /// | `SANDBOX_ENABLED`           | `true`                               |
    /// | `DOCKER_BIN`                | `docker`                             |
    /// | `SCANNER_IMAGE`             | `attribution-guard-scanner:latest`   |
    /// | `CONTAINER_PYTHON`          | `python`                             |
    /// | `CONTAINER_SCRIPT`          | `/app/cookie_stuffing_scanner.py`    |
    /// | `PYTHON_BIN`                | `./venv/bin/python`                  |
    /// | `SCANNER_SCRIPT`            | `./cookie_stuffing_scanner.py`       |
    /// | `SCANNER_REQUIREMENTS`      | `./requirements.txt`                 |
    /// | `SCAN_TIMEOUT_SECS`         | `1800`                               |
    /// | `MAX_CAPTURE_BYTES`         | `65536`                              |
    /// | `MAX_CONCURRENT_SCANS`      | `4`                                  |
    /// | `SCAN_QUEUE_CAPACITY`       | `256`                                |
    /// | `WORKSPACE_RETENTION_HOURS` | `72`                                 |
    /// | `RETENTION_SWEEP_SECS`      | `3600`                               |
    pub fn from_env() -> Self {
        let defaults = SandboxConfig::default();
        let sandbox = SandboxConfig {
            docker_bin: env_string("DOCKER_BIN", &defaults.docker_bin),
            image: env_string("SCANNER_IMAGE", &defaults.image),
            container_python: env_string("CONTAINER_PYTHON", &defaults.container_python),
            container_script: env_string("CONTAINER_SCRIPT", &defaults.container_script),
            mount_point: defaults.mount_point,
        };

        let direct = DirectConfig {
            interpreter: env_string("PYTHON_BIN", "./venv/bin/python"),
            script_source: PathBuf::from(env_string(
                "SCANNER_SCRIPT",
                "./cookie_stuffing_scanner.py",
            )),
            requirements_source: Some(PathBuf::from(env_string(
                "SCANNER_REQUIREMENTS",
                "./requirements.txt",
            ))),
        };

        Self {
            scans_dir: PathBuf::from(env_string("SCANS_DIR", "./scans")),
            sandbox_enabled: env_or("SANDBOX_ENABLED", true),
            sandbox,
            direct,
            timeout_secs: env_or("SCAN_TIMEOUT_SECS", 1800),
            max_capture_bytes: env_or("MAX_CAPTURE_BYTES", 64 * 1024),
            max_concurrent_scans: env_or("MAX_CONCURRENT_SCANS", 4),
            queue_capacity: env_or("SCAN_QUEUE_CAPACITY", 256),
            retention_hours: env_or("WORKSPACE_RETENTION_HOURS", 72),
            retention_sweep_secs: env_or("RETENTION_SWEEP_SECS", 3600),
        }
    }

    /// Per-process limits handed to both runners.
    pub fn capture_limits(&self) -> CaptureLimits {
        CaptureLimits {
            timeout: Duration::from_secs(self.timeout_secs),
            max_capture_bytes: self.max_capture_bytes,
        }
    }
}
