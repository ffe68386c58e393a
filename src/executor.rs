//! The central driver: builds the dependency graph, walks it level by
//! level, and owns the bounded async worker pool.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::sync::Semaphore;
use tracing::warn;
use uuid::Uuid;

use crate::context::Context;
use crate::error::{Result, WorkflowError};
use crate::execution::{Execution, ExecutionStatus};
use crate::graph::DependencyGraph;
use crate::logger::{LogLevel, Logger};
use crate::node::{Node, NodeResult};
use crate::registry::Registry;
use crate::store::StateStore;
use crate::workflow::{ExecutionMode, Node as NodeData, Workflow};

/// Drives a single `Workflow` run to completion. Owns the node registry, an
/// optional `StateStore`, and a `Logger`; the bounded worker pool is created
/// fresh for each run's async batch rather than held across runs, so
/// concurrent `execute` calls do not share a semaphore.
pub struct Executor {
    registry: Registry,
    max_workers: usize,
    store: Option<Arc<dyn StateStore>>,
    logger: Arc<Logger>,
}

impl Executor {
    pub fn new(registry: Registry, max_workers: usize) -> Self {
        Self {
            registry,
            max_workers: max_workers.max(1),
            store: None,
            logger: Arc::new(Logger::new(LogLevel::Info)),
        }
    }

    pub fn with_store(mut self, store: Arc<dyn StateStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_logger(mut self, logger: Arc<Logger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn logger(&self) -> &Arc<Logger> {
        &self.logger
    }

    /// Execute `workflow` against `initial_context` to completion (or to
    /// the first fatal failure). Always returns `Ok` — a validation or node
    /// failure is represented as a `Failed` `Execution`, not an `Err`;
    /// `Err` is reserved for node construction failures, which mean the
    /// workflow could not even be staged.
    pub async fn execute(&self, workflow: &Workflow, initial_context: Context) -> Result<Execution> {
        let exec_id = Uuid::new_v4().to_string();
        let mut execution = Execution::new(exec_id.clone(), workflow.id.clone(), initial_context.clone());
        self.save(&execution).await;

        let mut validation_errors = workflow.validate();
        let graph = DependencyGraph::build(workflow);
        validation_errors.extend(graph.validate());

        if !validation_errors.is_empty() {
            execution.start();
            execution.fail(validation_errors.join("; "));
            self.finish(&mut execution).await;
            return Ok(execution);
        }

        execution.start();
        self.save(&execution).await;
        if let Some(store) = &self.store {
            let _ = store.add_to_running(&exec_id).await;
        }
        self.logger
            .info(format!("workflow '{}' started (execution {exec_id})", workflow.id))
            .await;

        let node_map = workflow.node_map();
        let nodes = self.build_nodes(workflow)?;

        let mut context = initial_context;
        let mut completed: HashSet<String> = HashSet::new();
        let mut failed: HashSet<String> = HashSet::new();
        let mut node_outputs: HashMap<String, Value> = HashMap::new();
        let mut fatal: Option<String> = None;
        let mut cancelled: Option<Execution> = None;

        for (_level, ids) in graph.parallel_groups() {
            if let Some(stored) = self.observe_cancellation(&exec_id).await {
                cancelled = Some(stored);
                break;
            }

            let (sync_ids, async_ids): (Vec<&String>, Vec<&String>) = ids.iter().partition(|id| {
                node_map
                    .get(id.as_str())
                    .map(|n| n.config.execution_mode == ExecutionMode::Sync)
                    .unwrap_or(true)
            });

            for id in sync_ids {
                if !graph.can_execute(id, &completed, &failed) {
                    continue;
                }
                let Some(node_data) = node_map.get(id.as_str()) else {
                    continue;
                };
                let node = Arc::clone(nodes.get(id).expect("node constructed for every workflow node"));
                let input = self.assemble_input(node_data, workflow, &node_outputs, &context);
                let context_snapshot = context.clone();
                let id_owned = id.clone();

                // Run inline nodes through the runtime too so a panic is
                // caught as a `JoinError` rather than unwinding `execute()`
                // itself; the node still runs to completion before the next
                // one is dispatched.
                let result = match tokio::spawn(async move { node.execute(&context_snapshot, input).await }).await {
                    Ok(result) => result,
                    Err(join_err) => {
                        warn!(%join_err, node_id = %id_owned, "sync node task panicked");
                        NodeResult::from_raised(format!("node '{id_owned}' panicked: {join_err}"))
                    }
                };

                self.apply_result(
                    &mut execution,
                    &mut context,
                    &mut completed,
                    &mut failed,
                    &mut node_outputs,
                    id,
                    node_data,
                    result,
                )
                .await;
            }

            if !async_ids.is_empty() {
                let semaphore = Arc::new(Semaphore::new(self.max_workers));
                let mut handles: Vec<(String, tokio::task::JoinHandle<NodeResult>)> = Vec::new();

                for id in &async_ids {
                    if !graph.can_execute(id, &completed, &failed) {
                        continue;
                    }
                    let Some(node_data) = node_map.get(id.as_str()) else {
                        continue;
                    };
                    let node = Arc::clone(nodes.get(*id).expect("node constructed for every workflow node"));
                    let input = self.assemble_input(node_data, workflow, &node_outputs, &context);
                    let context_snapshot = context.clone();
                    let id_owned = (*id).clone();
                    let permit = Arc::clone(&semaphore);

                    let handle = tokio::spawn(async move {
                        let _permit = permit.acquire_owned().await.expect("semaphore is never closed");
                        node.execute(&context_snapshot, input).await
                    });
                    handles.push((id_owned, handle));
                }

                for (id, handle) in handles {
                    let result = match handle.await {
                        Ok(result) => result,
                        Err(join_err) => {
                            warn!(%join_err, node_id = %id, "async node task panicked");
                            NodeResult::from_raised(format!("node '{id}' panicked: {join_err}"))
                        }
                    };
                    let node_data = node_map.get(id.as_str()).expect("id came from node_map");
                    self.apply_result(
                        &mut execution,
                        &mut context,
                        &mut completed,
                        &mut failed,
                        &mut node_outputs,
                        &id,
                        node_data,
                        result,
                    )
                    .await;
                }
            }

            if !failed.is_empty()
                && failed.iter().any(|id| {
                    node_map
                        .get(id.as_str())
                        .map(|n| n.config.stop_workflow_on_fail)
                        .unwrap_or(true)
                })
            {
                let mut ids: Vec<&str> = failed.iter().map(String::as_str).collect();
                ids.sort_unstable();
                fatal = Some(format!("Some nodes failed: {}", ids.join(", ")));
                break;
            }
        }

        execution.context = context;
        match cancelled {
            Some(stored) => {
                execution.status = stored.status;
                execution.error = stored.error;
                execution.end_time = stored.end_time;
            }
            None => match fatal {
                Some(message) => {
                    execution.fail(message);
                }
                None => {
                    execution.complete();
                }
            },
        }

        self.finish(&mut execution).await;
        Ok(execution)
    }

    /// Between-level cancellation check (§4.2.3 / §5): if an external
    /// caller has transitioned the persisted record to `Failed` (via
    /// [`crate::store::cancel`]) since our last save, adopt that record and
    /// stop dispatching further levels. Returns `None` when unconfigured or
    /// when the stored record is not (yet) terminal.
    async fn observe_cancellation(&self, exec_id: &str) -> Option<Execution> {
        let store = self.store.as_ref()?;
        let stored = store.get_execution(exec_id).await.ok().flatten()?;
        (stored.status == ExecutionStatus::Failed).then_some(stored)
    }

    fn build_nodes(&self, workflow: &Workflow) -> Result<HashMap<String, Arc<dyn Node>>> {
        let mut nodes = HashMap::new();
        for node_data in &workflow.nodes {
            let node = self
                .registry
                .create(node_data)
                .map_err(|e| WorkflowError::Validation(e.to_string()))?;
            nodes.insert(node_data.id.clone(), node);
        }
        Ok(nodes)
    }

    /// Assemble a node's input per §4.2.1: keyed by the upstream node id
    /// that produced it, narrowed by `fromOutput` when the upstream's data
    /// is an object containing that key and otherwise passed whole. Also
    /// mirrored under `toInput` so that when two connections target the
    /// same slot, the last-observed connection wins that key. An explicit
    /// `nodes.<id>.input` object placed in the context is merged last,
    /// overriding any computed key it shares.
    fn assemble_input(
        &self,
        node_data: &NodeData,
        workflow: &Workflow,
        node_outputs: &HashMap<String, Value>,
        context: &Context,
    ) -> Value {
        let mut input = Map::new();

        for conn in &workflow.connections {
            if conn.to != node_data.id {
                continue;
            }
            let Some(output) = node_outputs.get(&conn.from) else {
                continue;
            };
            let slot_value = match output {
                Value::Object(map) if map.contains_key(&conn.from_output) => map[&conn.from_output].clone(),
                other => other.clone(),
            };
            input.insert(conn.from.clone(), slot_value.clone());
            input.insert(conn.to_input.clone(), slot_value);
        }

        if let Some(Value::Object(explicit)) = context.get(&format!("nodes.{}.input", node_data.id)) {
            for (key, value) in explicit {
                input.insert(key, value);
            }
        }

        Value::Object(input)
    }

    #[allow(clippy::too_many_arguments)]
    async fn apply_result(
        &self,
        execution: &mut Execution,
        context: &mut Context,
        completed: &mut HashSet<String>,
        failed: &mut HashSet<String>,
        node_outputs: &mut HashMap<String, Value>,
        id: &str,
        node_data: &NodeData,
        result: NodeResult,
    ) {
        for log in &result.logs {
            execution.push_log(id, log.clone());
        }

        if result.success {
            let data = result.data.unwrap_or(Value::Null);
            context.set_node_output(id, data.clone());
            node_outputs.insert(id.to_string(), data);
            completed.insert(id.to_string());
            self.logger.info(format!("node '{id}' completed")).await;
        } else {
            let message = result.error.unwrap_or_else(|| "node failed".to_string());
            if node_data.config.stop_workflow_on_fail {
                failed.insert(id.to_string());
                self.logger.error(format!("node '{id}' failed: {message}")).await;
            } else {
                completed.insert(id.to_string());
                self.logger
                    .warning(format!("node '{id}' failed (non-fatal): {message}"))
                    .await;
            }
        }

        execution.context = context.clone();
        self.save(execution).await;
    }

    async fn save(&self, execution: &Execution) {
        if let Some(store) = &self.store {
            let _ = store.save_execution(execution).await;
        }
    }

    /// Persist the terminal record, but never clobber a concurrent external
    /// cancellation: if the store already holds this execution as `Failed`
    /// (e.g. a `cancel()` landed in the race window after the last
    /// between-level check), adopt that terminal state instead of
    /// overwriting it with our own `Completed`/`Failed` outcome.
    async fn finish(&self, execution: &mut Execution) {
        if execution.status != ExecutionStatus::Failed {
            if let Some(stored) = self.observe_cancellation(&execution.id).await {
                execution.status = stored.status;
                execution.error = stored.error;
                execution.end_time = stored.end_time;
            }
        }

        self.save(execution).await;
        if let Some(store) = &self.store {
            let _ = store.remove_from_running(&execution.id).await;
            let _ = store.append_history(&execution.workflow_id, execution).await;
        }
        self.logger
            .info(format!(
                "workflow '{}' finished with status {:?}",
                execution.workflow_id, execution.status
            ))
            .await;
    }
}
