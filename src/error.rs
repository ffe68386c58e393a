use thiserror::Error;

/// Top-level error type for the dagflow-core library.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// Workflow or graph validation failed (duplicate id, missing connection
    /// endpoint, cycle).
    #[error("validation error: {0}")]
    Validation(String),

    /// A node returned `success=false` or raised, and the failure could not
    /// be absorbed by the failure policy.
    #[error("node error: {0}")]
    Node(String),

    /// The persistence backend is unreachable or unconfigured.
    #[error("state store unavailable: {0}")]
    StoreUnavailable(String),

    /// An external cancel request was observed.
    #[error("cancelled")]
    Cancelled,

    /// Invalid configuration (e.g. `executionMode` not in {sync, async}).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Wraps `std::io::Error`, surfaced while loading config from disk.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias used throughout the library.
pub type Result<T> = std::result::Result<T, WorkflowError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_display() {
        let err = WorkflowError::Validation("cycle involving a".into());
        assert_eq!(err.to_string(), "validation error: cycle involving a");
    }

    #[test]
    fn cancelled_display_is_reserved_string() {
        let err = WorkflowError::Cancelled;
        assert_eq!(err.to_string(), "cancelled");
    }

    #[test]
    fn io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "not found");
        let wf_err: WorkflowError = io_err.into();
        assert!(matches!(wf_err, WorkflowError::Io(_)));
    }
}
