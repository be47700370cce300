use crate::status::JobStatus;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Invalid state: job is {status}")]
    InvalidState { status: JobStatus },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Shorthand for a missing scan job.
    pub fn job_not_found(id: impl ToString) -> Self {
        Self::NotFound {
            entity: "Scan",
            id: id.to_string(),
        }
    }
}
