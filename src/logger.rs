//! Level-filtered structured log pipeline.
//!
//! Every entry is appended to an in-process ordered buffer and, when a
//! [`crate::store::StateStore`] is attached, also shipped via
//! `appendLog`. `tracing` events are emitted alongside for ambient
//! console/operator visibility — the two are complementary, not
//! redundant: `tracing` is ephemeral and human-facing, the `Logger`'s own
//! buffer is the execution-scoped, persisted record.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::store::StateStore;

/// Log severity, ordered `debug < info < warning < error < critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl LogLevel {
    fn rank(self) -> u8 {
        match self {
            LogLevel::Debug => 0,
            LogLevel::Info => 1,
            LogLevel::Warning => 2,
            LogLevel::Error => 3,
            LogLevel::Critical => 4,
        }
    }

    /// Parse a level name case-insensitively; used by [`crate::config::EngineConfig`].
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "debug" => Some(LogLevel::Debug),
            "info" => Some(LogLevel::Info),
            "warning" | "warn" => Some(LogLevel::Warning),
            "error" => Some(LogLevel::Error),
            "critical" => Some(LogLevel::Critical),
            _ => None,
        }
    }
}

impl PartialOrd for LogLevel {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.rank().cmp(&other.rank()))
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
            LogLevel::Critical => "CRITICAL",
        };
        write!(f, "{s}")
    }
}

/// A single persisted log record, carrying the run/node it was emitted for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    #[serde(default)]
    pub context: Value,
    #[serde(default)]
    pub execution_id: Option<String>,
    #[serde(default)]
    pub node_id: Option<String>,
}

/// Level-filtered structured logger with an in-process buffer and optional
/// `StateStore` shipping.
pub struct Logger {
    min_level: LogLevel,
    buffer: Mutex<Vec<LogRecord>>,
    store: Option<Arc<dyn StateStore>>,
}

impl Logger {
    pub fn new(min_level: LogLevel) -> Self {
        Self {
            min_level,
            buffer: Mutex::new(Vec::new()),
            store: None,
        }
    }

    pub fn with_store(min_level: LogLevel, store: Arc<dyn StateStore>) -> Self {
        Self {
            min_level,
            buffer: Mutex::new(Vec::new()),
            store: Some(store),
        }
    }

    /// Record a log entry. Entries below `min_level` are dropped entirely —
    /// they are neither buffered nor shipped to `tracing`/the store.
    pub async fn log(
        &self,
        level: LogLevel,
        message: impl Into<String>,
        context: Value,
        execution_id: Option<String>,
        node_id: Option<String>,
    ) {
        if level < self.min_level {
            return;
        }

        let message = message.into();
        emit_tracing(level, &message, execution_id.as_deref(), node_id.as_deref());

        let record = LogRecord {
            timestamp: Utc::now(),
            level,
            message,
            context,
            execution_id: execution_id.clone(),
            node_id,
        };

        self.buffer.lock().await.push(record.clone());

        if let Some(store) = &self.store {
            let date = record.timestamp.format("%Y-%m-%d").to_string();
            let _ = store.append_log(&date, record).await;
        }
    }

    pub async fn debug(&self, message: impl Into<String>) {
        self.log(LogLevel::Debug, message, Value::Null, None, None).await;
    }

    pub async fn info(&self, message: impl Into<String>) {
        self.log(LogLevel::Info, message, Value::Null, None, None).await;
    }

    pub async fn warning(&self, message: impl Into<String>) {
        self.log(LogLevel::Warning, message, Value::Null, None, None).await;
    }

    pub async fn error(&self, message: impl Into<String>) {
        self.log(LogLevel::Error, message, Value::Null, None, None).await;
    }

    /// Snapshot of everything currently buffered, oldest first.
    pub async fn records(&self) -> Vec<LogRecord> {
        self.buffer.lock().await.clone()
    }

    /// Pretty-printed JSON array of buffered records.
    pub async fn export_json(&self) -> String {
        let records = self.records().await;
        serde_json::to_string_pretty(&records).unwrap_or_else(|_| "[]".to_string())
    }

    /// CSV export: `timestamp,level,message,execution_id,node_id`,
    /// CRLF-terminated, quoted fields.
    pub async fn export_csv(&self) -> String {
        let mut out = String::from("timestamp,level,message,execution_id,node_id\r\n");
        for r in self.records().await {
            out.push_str(&format!(
                "{},{},{},{},{}\r\n",
                csv_quote(&r.timestamp.format("%Y-%m-%d %H:%M:%S%.6f").to_string()),
                csv_quote(&r.level.to_string()),
                csv_quote(&r.message),
                csv_quote(r.execution_id.as_deref().unwrap_or("")),
                csv_quote(r.node_id.as_deref().unwrap_or("")),
            ));
        }
        out
    }

    /// Plain-text export: one line per record,
    /// `[ts] LEVEL: message (Execution: …)(Node: …)`.
    pub async fn export_text(&self) -> String {
        let mut out = String::new();
        for r in self.records().await {
            let mut line = format!(
                "[{}] {}: {}",
                r.timestamp.format("%Y-%m-%d %H:%M:%S%.6f"),
                r.level,
                r.message
            );
            if let Some(exec_id) = &r.execution_id {
                line.push_str(&format!("(Execution: {exec_id})"));
            }
            if let Some(node_id) = &r.node_id {
                line.push_str(&format!("(Node: {node_id})"));
            }
            out.push_str(&line);
            out.push('\n');
        }
        out
    }
}

fn emit_tracing(level: LogLevel, message: &str, execution_id: Option<&str>, node_id: Option<&str>) {
    match level {
        LogLevel::Debug => debug!(execution_id, node_id, "{}", message),
        LogLevel::Info => info!(execution_id, node_id, "{}", message),
        LogLevel::Warning => warn!(execution_id, node_id, "{}", message),
        LogLevel::Error | LogLevel::Critical => error!(execution_id, node_id, "{}", message),
    }
}

fn csv_quote(field: &str) -> String {
    format!("\"{}\"", field.replace('"', "\"\""))
}
