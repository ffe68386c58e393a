//! Abstract persistence collaborator and an in-memory implementation for
//! tests and single-process use.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;

use crate::error::Result;
use crate::execution::Execution;
use crate::logger::LogRecord;

const HISTORY_LIMIT: usize = 100;

fn execution_ttl() -> Duration {
    Duration::seconds(3_600)
}

fn history_ttl() -> Duration {
    Duration::seconds(604_800)
}

fn log_ttl() -> Duration {
    Duration::seconds(2_592_000)
}

/// External persistence collaborator. All operations are optional in the
/// sense that a caller without a backend simply never constructs one — the
/// core never falls back to a no-op implementation of its own.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn save_execution(&self, exec: &Execution) -> Result<()>;
    async fn add_to_running(&self, id: &str) -> Result<()>;
    async fn remove_from_running(&self, id: &str) -> Result<()>;
    async fn list_running(&self) -> Result<Vec<String>>;
    async fn append_history(&self, workflow_id: &str, exec: &Execution) -> Result<()>;
    async fn list_history(&self, workflow_id: &str) -> Result<Vec<Execution>>;
    async fn append_log(&self, date: &str, entry: LogRecord) -> Result<()>;
    async fn get_execution(&self, id: &str) -> Result<Option<Execution>>;
}

struct Expiring<T> {
    value: T,
    expires_at: DateTime<Utc>,
}

impl<T> Expiring<T> {
    fn new(value: T, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: Utc::now() + ttl,
        }
    }

    fn is_live(&self) -> bool {
        Utc::now() < self.expires_at
    }
}

#[derive(Default)]
struct Inner {
    executions: HashMap<String, Expiring<Execution>>,
    running: HashSet<String>,
    history: HashMap<String, Expiring<Vec<Execution>>>,
    logs: HashMap<String, Expiring<Vec<LogRecord>>>,
}

/// `tokio::sync::Mutex`-backed `StateStore` matching the keyspace described
/// in §6: `workflow_execution:<id>` (TTL 1h), `running_executions` (a set),
/// `workflow_history:<workflowId>` (TTL 7d, capped at 100), and
/// `workflow_logs:<date>` (TTL 30d). Expiry is tracked and enforced lazily on
/// read rather than swept in the background — the store is not a daemon.
#[derive(Default)]
pub struct InMemoryStateStore {
    inner: Mutex<Inner>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test/inspection convenience: logs for `date`, empty if expired or absent.
    pub async fn list_logs(&self, date: &str) -> Vec<LogRecord> {
        let inner = self.inner.lock().await;
        inner
            .logs
            .get(date)
            .filter(|e| e.is_live())
            .map(|e| e.value.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn save_execution(&self, exec: &Execution) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner
            .executions
            .insert(exec.id.clone(), Expiring::new(exec.clone(), execution_ttl()));
        Ok(())
    }

    async fn add_to_running(&self, id: &str) -> Result<()> {
        self.inner.lock().await.running.insert(id.to_string());
        Ok(())
    }

    async fn remove_from_running(&self, id: &str) -> Result<()> {
        self.inner.lock().await.running.remove(id);
        Ok(())
    }

    async fn list_running(&self) -> Result<Vec<String>> {
        Ok(self.inner.lock().await.running.iter().cloned().collect())
    }

    async fn append_history(&self, workflow_id: &str, exec: &Execution) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let entry = inner
            .history
            .entry(workflow_id.to_string())
            .or_insert_with(|| Expiring::new(Vec::new(), history_ttl()));
        entry.value.insert(0, exec.clone());
        entry.value.truncate(HISTORY_LIMIT);
        entry.expires_at = Utc::now() + history_ttl();
        Ok(())
    }

    async fn list_history(&self, workflow_id: &str) -> Result<Vec<Execution>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .history
            .get(workflow_id)
            .filter(|e| e.is_live())
            .map(|e| e.value.clone())
            .unwrap_or_default())
    }

    async fn append_log(&self, date: &str, entry: LogRecord) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let slot = inner
            .logs
            .entry(date.to_string())
            .or_insert_with(|| Expiring::new(Vec::new(), log_ttl()));
        slot.value.push(entry);
        slot.expires_at = Utc::now() + log_ttl();
        Ok(())
    }

    async fn get_execution(&self, id: &str) -> Result<Option<Execution>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .executions
            .get(id)
            .filter(|e| e.is_live())
            .map(|e| e.value.clone()))
    }
}

/// External cancel request: load `id`, and if it is still `Running`,
/// transition it to `Failed("cancelled")` and persist. Returns `true` if a
/// transition happened. The executor does not poll for this mid-run — a
/// concurrently running `execute()` may still overwrite this with its own
/// next persisted update; that race is accepted per §5.
pub async fn cancel(store: &dyn StateStore, id: &str) -> Result<bool> {
    let Some(mut exec) = store.get_execution(id).await? else {
        return Ok(false);
    };
    if !exec.cancel() {
        return Ok(false);
    }
    store.save_execution(&exec).await?;
    store.remove_from_running(id).await?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;

    fn execution(id: &str, workflow_id: &str) -> Execution {
        Execution::new(id.to_string(), workflow_id.to_string(), Context::new())
    }

    #[tokio::test]
    async fn save_and_get_round_trip() {
        let store = InMemoryStateStore::new();
        let exec = execution("e1", "wf1");
        store.save_execution(&exec).await.unwrap();
        let loaded = store.get_execution("e1").await.unwrap();
        assert_eq!(loaded.unwrap().id, "e1");
    }

    #[tokio::test]
    async fn get_missing_execution_is_none() {
        let store = InMemoryStateStore::new();
        assert!(store.get_execution("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn running_set_membership() {
        let store = InMemoryStateStore::new();
        store.add_to_running("e1").await.unwrap();
        store.add_to_running("e2").await.unwrap();
        let mut running = store.list_running().await.unwrap();
        running.sort();
        assert_eq!(running, vec!["e1".to_string(), "e2".to_string()]);
        store.remove_from_running("e1").await.unwrap();
        assert_eq!(store.list_running().await.unwrap(), vec!["e2".to_string()]);
    }

    #[tokio::test]
    async fn history_is_prepended_newest_first_and_capped() {
        let store = InMemoryStateStore::new();
        for i in 0..110 {
            store
                .append_history("wf1", &execution(&format!("e{i}"), "wf1"))
                .await
                .unwrap();
        }
        let history = store.list_history("wf1").await.unwrap();
        assert_eq!(history.len(), 100);
        assert_eq!(history[0].id, "e109");
    }

    #[tokio::test]
    async fn history_for_unknown_workflow_is_empty() {
        let store = InMemoryStateStore::new();
        assert!(store.list_history("nope").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn cancel_transitions_running_execution_to_failed() {
        let store = InMemoryStateStore::new();
        let mut exec = execution("e1", "wf1");
        exec.start();
        store.save_execution(&exec).await.unwrap();
        store.add_to_running("e1").await.unwrap();

        let transitioned = cancel(&store, "e1").await.unwrap();
        assert!(transitioned);

        let loaded = store.get_execution("e1").await.unwrap().unwrap();
        assert_eq!(loaded.error.as_deref(), Some("cancelled"));
        assert!(!store.list_running().await.unwrap().contains(&"e1".to_string()));
    }

    #[tokio::test]
    async fn cancel_on_pending_execution_is_noop() {
        let store = InMemoryStateStore::new();
        let exec = execution("e1", "wf1");
        store.save_execution(&exec).await.unwrap();

        let transitioned = cancel(&store, "e1").await.unwrap();
        assert!(!transitioned);
    }

    #[tokio::test]
    async fn cancel_unknown_execution_is_noop() {
        let store = InMemoryStateStore::new();
        assert!(!cancel(&store, "missing").await.unwrap());
    }
}
