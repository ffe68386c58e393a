//! The polymorphic node capability: identity, config, and the
//! `execute`/`validate`/`describe` operations every registered node kind
//! exposes to the executor.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::Context;
use crate::workflow::NodeConfig;

/// Severity of a single log entry, shared with [`crate::logger::LogLevel`].
pub use crate::logger::LogLevel;

/// One log line emitted by a node during `execute`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub level: LogLevel,
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
    pub timestamp: DateTime<Utc>,
}

impl LogEntry {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            data: None,
            timestamp: Utc::now(),
        }
    }
}

/// What a node returns from a single `execute` call.
///
/// Exactly one of the success/failure branches is meaningful: `error` is
/// only inspected when `success == false`, though `data` may still be
/// present on failure (partial results).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeResult {
    pub success: bool,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub logs: Vec<LogEntry>,
}

impl NodeResult {
    pub fn success(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            logs: Vec::new(),
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            logs: Vec::new(),
        }
    }

    pub fn with_logs(mut self, logs: Vec<LogEntry>) -> Self {
        self.logs = logs;
        self
    }

    /// Convert an uncaught node panic/error message into the synthetic
    /// failure result described in spec §4.2.2.
    pub fn from_raised(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            success: false,
            data: None,
            error: Some(message.clone()),
            logs: vec![LogEntry::new(LogLevel::Error, message)],
        }
    }
}

/// Descriptive metadata returned by [`Node::describe`], used by tooling to
/// present a node kind (not consulted by the executor's control flow).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct NodeDescriptor {
    pub description: String,
    pub category: String,
    pub icon: String,
    pub input_schema: Value,
    pub output_schema: Value,
}

/// The narrow capability every registered node kind implements. Variants
/// correspond to registered kinds; new kinds are added by registering a
/// factory with a [`crate::registry::Registry`], not by subclassing.
#[async_trait]
pub trait Node: Send + Sync {
    fn id(&self) -> &str;
    fn name(&self) -> &str;
    fn node_type(&self) -> &str;
    fn config(&self) -> &NodeConfig;

    /// Execute this node against an immutable context snapshot and an
    /// assembled input map. Implementations must not attempt to mutate
    /// `context` — the executor is the single writer of shared state.
    async fn execute(&self, context: &Context, input: Value) -> NodeResult;

    /// Structural self-check, run at registry construction time.
    fn validate(&self) -> bool {
        true
    }

    /// Descriptive metadata for tooling; not consulted by the executor.
    fn describe(&self) -> NodeDescriptor {
        NodeDescriptor::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_result_success_has_no_error() {
        let r = NodeResult::success(Value::from(1));
        assert!(r.success);
        assert!(r.error.is_none());
    }

    #[test]
    fn node_result_failure_has_no_data_by_default() {
        let r = NodeResult::failure("boom");
        assert!(!r.success);
        assert_eq!(r.error.as_deref(), Some("boom"));
        assert!(r.data.is_none());
    }

    #[test]
    fn from_raised_attaches_error_log() {
        let r = NodeResult::from_raised("panic: index out of bounds");
        assert!(!r.success);
        assert_eq!(r.logs.len(), 1);
        assert_eq!(r.logs[0].level, LogLevel::Error);
    }

    #[test]
    fn log_entry_round_trips_json() {
        let entry = LogEntry::new(LogLevel::Warning, "careful");
        let json = serde_json::to_string(&entry).unwrap();
        let back: LogEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(back.message, "careful");
        assert_eq!(back.level, LogLevel::Warning);
    }
}
