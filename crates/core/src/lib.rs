//! Scan job domain logic.
//!
//! Everything here is free of HTTP concerns: workspace layout, job status
//! tracking, the sandboxed and direct scan runners with their fallback
//! state machine, report normalization, and upload validation. The `api`
//! crate composes these behind the HTTP surface.

pub mod error;
pub mod registry;
pub mod report;
pub mod scanning;
pub mod status;
pub mod types;
pub mod upload;
pub mod workspace;
