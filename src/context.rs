//! Shared, dotted-path keyed data map passed to every node invocation.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::template;

/// Shared execution context: a `data` layer (user/shared state, including
/// each node's published output under `nodes.<id>.output`) and a
/// `variables` layer (template scope). Both are addressed via dotted paths.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Context {
    pub data: Map<String, Value>,
    pub variables: Map<String, Value>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a context seeded with an initial `data` map.
    pub fn with_data(data: Map<String, Value>) -> Self {
        Self {
            data,
            variables: Map::new(),
        }
    }

    /// Look up a dotted path. Descends through `data` first, then
    /// `variables` (an access against the merged `data ∪ variables` view).
    pub fn get(&self, path: &str) -> Option<Value> {
        get_path(&Value::Object(self.data.clone()), path)
            .or_else(|| get_path(&Value::Object(self.variables.clone()), path))
    }

    /// Set a dotted path in `data`, creating intermediate objects as needed.
    pub fn set(&mut self, path: &str, value: Value) {
        set_path(&mut self.data, path, value);
    }

    pub fn has(&self, path: &str) -> bool {
        self.get(path).is_some()
    }

    /// Remove a dotted path from `data`. No-op if absent.
    pub fn remove(&mut self, path: &str) -> Option<Value> {
        remove_path(&mut self.data, path)
    }

    /// Recursively deep-merge `other` into `data`: where both sides have a
    /// map at the same key, merge recursively; otherwise the right side
    /// (`other`) wins. Sequences are not concatenated.
    pub fn merge(&mut self, other: &Map<String, Value>) {
        deep_merge(&mut self.data, other);
    }

    /// Merge a map into `variables` using the same deep-merge semantics.
    pub fn merge_variables(&mut self, other: &Map<String, Value>) {
        deep_merge(&mut self.variables, other);
    }

    /// Render `{{dotted.key}}` occurrences in `template` against the merged
    /// `data ∪ variables` view.
    pub fn process_template(&self, template: &str) -> String {
        template::render(template, &|key| self.get(key))
    }

    /// Deep-walk a JSON tree, substituting every string leaf via
    /// `process_template`. Non-string leaves, array elements, and nested
    /// objects are preserved structurally.
    pub fn process_templates(&self, value: &Value) -> Value {
        match value {
            Value::String(s) => Value::String(self.process_template(s)),
            Value::Array(items) => {
                Value::Array(items.iter().map(|v| self.process_templates(v)).collect())
            }
            Value::Object(map) => {
                let mut out = Map::with_capacity(map.len());
                for (k, v) in map {
                    out.insert(k.clone(), self.process_templates(v));
                }
                Value::Object(out)
            }
            other => other.clone(),
        }
    }

    /// Reserve the `nodes.<id>.output` subtree for a node's published output.
    pub fn set_node_output(&mut self, node_id: &str, data: Value) {
        self.set(&format!("nodes.{node_id}.output"), data);
    }

    pub fn node_output(&self, node_id: &str) -> Option<Value> {
        self.get(&format!("nodes.{node_id}.output"))
    }
}

fn split(path: &str) -> Vec<&str> {
    path.split('.').filter(|s| !s.is_empty()).collect()
}

fn get_path(root: &Value, path: &str) -> Option<Value> {
    let mut current = root;
    for segment in split(path) {
        current = current.as_object()?.get(segment)?;
    }
    Some(current.clone())
}

fn set_path(root: &mut Map<String, Value>, path: &str, value: Value) {
    let segments = split(path);
    let Some((last, ancestors)) = segments.split_last() else {
        return;
    };

    let mut current = root;
    for segment in ancestors {
        let entry = current
            .entry((*segment).to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        current = entry.as_object_mut().expect("just ensured object");
    }
    current.insert((*last).to_string(), value);
}

fn remove_path(root: &mut Map<String, Value>, path: &str) -> Option<Value> {
    let segments = split(path);
    let (last, ancestors) = segments.split_last()?;

    let mut current = root;
    for segment in ancestors {
        current = current.get_mut(*segment)?.as_object_mut()?;
    }
    current.remove(*last)
}

fn deep_merge(dest: &mut Map<String, Value>, src: &Map<String, Value>) {
    for (key, value) in src {
        match (dest.get_mut(key), value) {
            (Some(Value::Object(dest_map)), Value::Object(src_map)) => {
                deep_merge(dest_map, src_map);
            }
            _ => {
                dest.insert(key.clone(), value.clone());
            }
        }
    }
}
