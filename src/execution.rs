//! The run's observable state: status machine, per-node logs, and timing.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::context::Context;
use crate::node::LogEntry;

/// Lifecycle of a single `execute` call. Terminal states (`Completed`,
/// `Failed`) are sinks — no further transition is valid once reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

/// A single run of a workflow: its status, the context as last observed,
/// per-node logs, and wall-clock timing at microsecond precision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Execution {
    pub id: String,
    #[serde(rename = "workflowId")]
    pub workflow_id: String,
    pub context: Context,
    pub status: ExecutionStatus,
    #[serde(default)]
    pub logs: HashMap<String, Vec<LogEntry>>,
    #[serde(rename = "startTime")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(rename = "endTime")]
    pub end_time: Option<DateTime<Utc>>,
    /// Error message when `status == Failed`.
    #[serde(default)]
    pub error: Option<String>,
}

impl Execution {
    /// Construct a fresh, not-yet-started execution.
    pub fn new(id: String, workflow_id: String, context: Context) -> Self {
        Self {
            id,
            workflow_id,
            context,
            status: ExecutionStatus::Pending,
            logs: HashMap::new(),
            start_time: None,
            end_time: None,
            error: None,
        }
    }

    /// `pending -> running`. No-op (returns `false`) outside `Pending`.
    pub fn start(&mut self) -> bool {
        if self.status != ExecutionStatus::Pending {
            return false;
        }
        self.status = ExecutionStatus::Running;
        self.start_time = Some(Utc::now());
        true
    }

    /// `running -> completed`.
    pub fn complete(&mut self) -> bool {
        if self.status != ExecutionStatus::Running {
            return false;
        }
        self.status = ExecutionStatus::Completed;
        self.end_time = Some(Utc::now());
        true
    }

    /// `running -> failed(error)`.
    pub fn fail(&mut self, error: impl Into<String>) -> bool {
        if self.status != ExecutionStatus::Running {
            return false;
        }
        self.status = ExecutionStatus::Failed;
        self.error = Some(error.into());
        self.end_time = Some(Utc::now());
        true
    }

    /// External cancellation: `running -> failed("cancelled")`, matching the
    /// reserved error string used throughout cancel handling.
    pub fn cancel(&mut self) -> bool {
        self.fail("cancelled")
    }

    /// Microsecond-precision wall-clock duration once both timestamps are set.
    pub fn duration(&self) -> Option<chrono::Duration> {
        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) => Some(end - start),
            _ => None,
        }
    }

    /// Append one log entry under `node_id`, preserving arrival order.
    pub fn push_log(&mut self, node_id: &str, entry: LogEntry) {
        self.logs.entry(node_id.to_string()).or_default().push(entry);
    }
}
