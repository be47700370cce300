//! Scan execution: two interchangeable runners and the fallback between them.
//!
//! - [`sandboxed::SandboxedRunner`] runs the scanner image through the
//!   Docker CLI with the job workspace mounted.
//! - [`direct::DirectRunner`] stages the scanner script into the workspace
//!   and runs it with a local Python interpreter.
//! - [`fallback::FallbackController`] tries the sandbox first and switches to
//!   the direct runner only when the sandbox environment is unusable.
//!
//! All process handling goes through [`subprocess::run_command`].

pub mod direct;
pub mod executor;
pub mod fallback;
pub mod sandboxed;
pub mod subprocess;
