//! Immutable workflow definition: the wire/on-disk shape described in
//! spec §6, built by an external format adapter and handed to the
//! [`crate::executor::Executor`].

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A workflow: a named DAG of [`Node`]s joined by [`Connection`]s.
///
/// `nodes` is carried as the ordered sequence the wire format (§6) uses;
/// [`Workflow::node_map`] gives the id-keyed view the rest of the core
/// operates on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub connections: Vec<Connection>,
}

impl Workflow {
    /// Id-keyed view of `nodes`, built on demand.
    pub fn node_map(&self) -> HashMap<&str, &Node> {
        self.nodes.iter().map(|n| (n.id.as_str(), n)).collect()
    }

    /// Structural validation independent of graph reachability: node ids
    /// must be unique and non-empty, every connection endpoint must
    /// reference a node that exists, and each node's `executionMode` must
    /// be one of the two recognized values. Cycle/reachability validation
    /// is the [`crate::graph::DependencyGraph`]'s job.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        let mut seen = std::collections::HashSet::new();

        for node in &self.nodes {
            if node.id.is_empty() {
                errors.push("node id must not be empty".to_string());
            } else if !seen.insert(node.id.as_str()) {
                errors.push(format!("duplicate node id '{}'", node.id));
            }
        }

        let ids = self.node_map();
        for conn in &self.connections {
            if !ids.contains_key(conn.from.as_str()) {
                errors.push(format!(
                    "connection references unknown source node '{}'",
                    conn.from
                ));
            }
            if !ids.contains_key(conn.to.as_str()) {
                errors.push(format!(
                    "connection references unknown target node '{}'",
                    conn.to
                ));
            }
        }

        errors
    }
}

/// A directed edge from one node's output slot to another node's input slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Connection {
    pub from: String,
    pub to: String,
    #[serde(default = "default_output_slot", rename = "fromOutput")]
    pub from_output: String,
    #[serde(default = "default_input_slot", rename = "toInput")]
    pub to_input: String,
}

fn default_output_slot() -> String {
    "output".to_string()
}

fn default_input_slot() -> String {
    "input".to_string()
}

/// A node's identity and configuration tree, as found in a `Workflow`.
/// This is the *data* shape; the runtime capability (`execute`/`validate`/
/// `describe`) lives behind [`crate::node::Node`] trait objects constructed
/// by the [`crate::registry::Registry`] from this data plus a registered
/// factory for `node_type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default)]
    pub config: NodeConfig,
}

/// A node's config tree: arbitrary key/value data plus the two core keys
/// the executor inspects directly.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeConfig {
    #[serde(default = "default_true", rename = "stopWorkflowOnFail")]
    pub stop_workflow_on_fail: bool,
    #[serde(default, rename = "executionMode")]
    pub execution_mode: ExecutionMode,
    /// Everything else — node-specific options.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_true() -> bool {
    true
}

impl NodeConfig {
    /// Apply template interpolation over every string value in `extra`
    /// using `ctx`, returning the substituted tree.
    pub fn interpolated(&self, ctx: &crate::context::Context) -> Map<String, Value> {
        match ctx.process_templates(&Value::Object(self.extra.clone())) {
            Value::Object(map) => map,
            _ => self.extra.clone(),
        }
    }
}

/// Whether a node runs inline on the executor thread or is dispatched to the
/// bounded async worker pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    #[default]
    Sync,
    Async,
}
