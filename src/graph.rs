//! Dependency graph derived from a [`crate::workflow::Workflow`] at run
//! start: adjacency, BFS topological levels, cycle detection, parallel
//! groups.

use std::collections::{HashMap, HashSet};

use crate::workflow::Workflow;

/// Dependency graph built from a workflow's connections.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    deps: HashMap<String, Vec<String>>,
    dependents: HashMap<String, Vec<String>>,
    level: HashMap<String, usize>,
    parallel_groups: Vec<(usize, Vec<String>)>,
}

impl DependencyGraph {
    /// Build adjacency and assign levels from `workflow`. Always succeeds —
    /// an invalid graph (cycle, unreachable node) is represented by an empty
    /// or partial `level` map; call [`DependencyGraph::validate`] to surface
    /// that as errors.
    pub fn build(workflow: &Workflow) -> Self {
        let mut deps: HashMap<String, Vec<String>> = HashMap::new();
        let mut dependents: HashMap<String, Vec<String>> = HashMap::new();

        for node in &workflow.nodes {
            deps.entry(node.id.clone()).or_default();
            dependents.entry(node.id.clone()).or_default();
        }

        for conn in &workflow.connections {
            deps.entry(conn.to.clone()).or_default().push(conn.from.clone());
            dependents
                .entry(conn.from.clone())
                .or_default()
                .push(conn.to.clone());
        }

        let level = assign_levels(&deps, &dependents);
        let parallel_groups = group_by_level(&level);

        Self {
            deps,
            dependents,
            level,
            parallel_groups,
        }
    }

    /// Direct predecessors of `id`.
    pub fn deps_of(&self, id: &str) -> &[String] {
        self.deps.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Direct successors of `id`.
    pub fn dependents_of(&self, id: &str) -> &[String] {
        self.dependents.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// BFS depth of `id`, if it was reachable from a start node.
    pub fn level_of(&self, id: &str) -> Option<usize> {
        self.level.get(id).copied()
    }

    /// Parallel groups in ascending level order: `(level, [ids])`.
    pub fn parallel_groups(&self) -> &[(usize, Vec<String>)] {
        &self.parallel_groups
    }

    /// Ids with no dependencies.
    pub fn start_nodes(&self) -> Vec<String> {
        self.deps
            .iter()
            .filter(|(_, d)| d.is_empty())
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Ids with no dependents.
    pub fn end_nodes(&self) -> Vec<String> {
        self.dependents
            .iter()
            .filter(|(_, d)| d.is_empty())
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// True iff every dependency of `id` is in `completed` and none is in
    /// `failed`.
    pub fn can_execute(&self, id: &str, completed: &HashSet<String>, failed: &HashSet<String>) -> bool {
        self.deps_of(id)
            .iter()
            .all(|d| completed.contains(d) && !failed.contains(d))
    }

    /// Validate the graph, returning one error message per problem found.
    /// A non-empty result means the graph must not be executed.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        let total = self.deps.len();
        let leveled = self.level.len();
        if leveled < total {
            for id in self.deps.keys() {
                if !self.level.contains_key(id) {
                    errors.push(format!("cycle involving {id}"));
                }
            }
        }

        errors
    }
}

/// In-degree BFS: nodes with no unresolved deps enter the queue at level 0;
/// a dependent is enqueued at `1 + max(deps.level)` once every one of its
/// deps has been leveled.
fn assign_levels(
    deps: &HashMap<String, Vec<String>>,
    dependents: &HashMap<String, Vec<String>>,
) -> HashMap<String, usize> {
    let mut remaining: HashMap<&str, usize> = deps
        .iter()
        .map(|(id, d)| (id.as_str(), d.len()))
        .collect();

    let mut level = HashMap::new();
    let mut queue: Vec<&str> = remaining
        .iter()
        .filter(|(_, &count)| count == 0)
        .map(|(&id, _)| id)
        .collect();
    queue.sort_unstable();

    let mut current_level = 0usize;
    while !queue.is_empty() {
        let mut next_queue: Vec<&str> = Vec::new();

        for &id in &queue {
            level.insert(id.to_string(), current_level);
        }

        for &id in &queue {
            if let Some(dependent_ids) = dependents.get(id) {
                for dep_id in dependent_ids {
                    if let Some(count) = remaining.get_mut(dep_id.as_str()) {
                        *count -= 1;
                        if *count == 0 {
                            next_queue.push(dep_id.as_str());
                        }
                    }
                }
            }
        }

        next_queue.sort_unstable();
        next_queue.dedup();
        queue = next_queue;
        current_level += 1;
    }

    level
}

fn group_by_level(level: &HashMap<String, usize>) -> Vec<(usize, Vec<String>)> {
    let mut by_level: HashMap<usize, Vec<String>> = HashMap::new();
    for (id, &lvl) in level {
        by_level.entry(lvl).or_default().push(id.clone());
    }

    let mut groups: Vec<(usize, Vec<String>)> = by_level.into_iter().collect();
    groups.sort_by_key(|(lvl, _)| *lvl);
    for (_, ids) in &mut groups {
        ids.sort();
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::{Connection, Node, NodeConfig, Workflow};

    fn node(id: &str) -> Node {
        Node {
            id: id.to_string(),
            name: id.to_string(),
            node_type: "noop".to_string(),
            config: NodeConfig::default(),
        }
    }

    fn workflow(ids: &[&str], edges: &[(&str, &str)]) -> Workflow {
        let nodes: Vec<Node> = ids.iter().map(|id| node(id)).collect();
        Workflow {
            id: "wf".into(),
            name: "wf".into(),
            description: String::new(),
            nodes,
            connections: edges
                .iter()
                .map(|(from, to)| Connection {
                    from: from.to_string(),
                    to: to.to_string(),
                    from_output: "output".into(),
                    to_input: "input".into(),
                })
                .collect(),
        }
    }

    #[test]
    fn empty_workflow_has_no_levels() {
        let wf = workflow(&[], &[]);
        let graph = DependencyGraph::build(&wf);
        assert!(graph.parallel_groups().is_empty());
        assert!(graph.validate().is_empty());
    }

    #[test]
    fn isolated_nodes_all_at_level_zero() {
        let wf = workflow(&["a", "b", "c"], &[]);
        let graph = DependencyGraph::build(&wf);
        assert_eq!(graph.parallel_groups().len(), 1);
        assert_eq!(graph.parallel_groups()[0].0, 0);
        assert_eq!(graph.parallel_groups()[0].1, vec!["a", "b", "c"]);
    }

    #[test]
    fn linear_chain_levels() {
        let wf = workflow(&["a", "b", "c"], &[("a", "b"), ("b", "c")]);
        let graph = DependencyGraph::build(&wf);
        let groups = graph.parallel_groups();
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[0], (0, vec!["a".to_string()]));
        assert_eq!(groups[1], (1, vec!["b".to_string()]));
        assert_eq!(groups[2], (2, vec!["c".to_string()]));
    }

    #[test]
    fn diamond_middle_is_parallel() {
        let wf = workflow(
            &["a", "b", "c", "d"],
            &[("a", "b"), ("a", "c"), ("b", "d"), ("c", "d")],
        );
        let graph = DependencyGraph::build(&wf);
        let groups = graph.parallel_groups();
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[1].1, vec!["b".to_string(), "c".to_string()]);
        assert_eq!(graph.level_of("d"), Some(2));
    }

    #[test]
    fn cycle_is_invalid() {
        let wf = workflow(&["a", "b"], &[("a", "b"), ("b", "a")]);
        let graph = DependencyGraph::build(&wf);
        let errors = graph.validate();
        assert!(!errors.is_empty());
        assert!(errors.iter().any(|e| e.contains("cycle")));
    }

    #[test]
    fn duplicate_connection_does_not_duplicate_dependency() {
        let wf = workflow(&["a", "b"], &[("a", "b"), ("a", "b")]);
        let graph = DependencyGraph::build(&wf);
        // deps_of retains the duplicate edge (I/O mapping relevance) but the
        // level assignment must still treat it as a single dependency.
        assert_eq!(graph.level_of("b"), Some(1));
    }

    #[test]
    fn can_execute_respects_completed_and_failed() {
        let wf = workflow(&["a", "b"], &[("a", "b")]);
        let graph = DependencyGraph::build(&wf);
        let mut completed = std::collections::HashSet::new();
        let failed = std::collections::HashSet::new();
        assert!(!graph.can_execute("b", &completed, &failed));
        completed.insert("a".to_string());
        assert!(graph.can_execute("b", &completed, &failed));
    }

    #[test]
    fn start_and_end_nodes() {
        let wf = workflow(&["a", "b", "c"], &[("a", "b"), ("b", "c")]);
        let graph = DependencyGraph::build(&wf);
        assert_eq!(graph.start_nodes(), vec!["a".to_string()]);
        assert_eq!(graph.end_nodes(), vec!["c".to_string()]);
    }
}
