//! Long-running background tasks spawned at startup.

pub mod workspace_retention;
