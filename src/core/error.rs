use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum SagaError {
    #[error("Saga instance '{0}' already exists")]
    Conflict(Uuid),

    #[error("Saga instance '{0}' not found")]
    NotFound(Uuid),

    #[error("Saga instance '{correlation_id}' version mismatch: expected {expected}, found {actual}")]
    ConcurrencyViolation {
        correlation_id: Uuid,
        expected: u64,
        actual: u64,
    },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Not implemented by design: {0}")]
    NotImplementedByDesign(String),
}

impl SagaError {
    /// True when an insert lost the race for a correlation id.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    /// True when the backend category can never serve the request.
    pub fn is_not_implemented_by_design(&self) -> bool {
        matches!(self, Self::NotImplementedByDesign(_))
    }

    /// Whether the enclosing pipeline may reasonably redeliver the message.
    ///
    /// Structural failures (`NotImplementedByDesign`), data errors and
    /// cancellation are permanent for the current attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ConcurrencyViolation { .. } | Self::Timeout(_) | Self::Io(_) | Self::Backend(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, SagaError>;

impl From<serde_json::Error> for SagaError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for SagaError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
