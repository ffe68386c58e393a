pub mod config;
pub mod context;
pub mod error;
pub mod execution;
pub mod executor;
pub mod graph;
pub mod logger;
pub mod node;
pub mod registry;
pub mod store;
pub mod template;
pub mod workflow;

pub use error::{Result, WorkflowError};

use tracing::info;

/// Initialise a default tracing subscriber for the library consumer.
///
/// Call this once at program start. Uses `RUST_LOG` env var for filtering,
/// defaulting to `info` level.
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    fmt().with_env_filter(filter).init();

    info!("dagflow tracing initialised");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = WorkflowError::Configuration("missing field".into());
        assert_eq!(err.to_string(), "configuration error: missing field");
    }

    #[test]
    fn io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "not found");
        let wf_err: WorkflowError = io_err.into();
        assert!(matches!(wf_err, WorkflowError::Io(_)));
    }
}
