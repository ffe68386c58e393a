//! Typed node construction by registered type name or alias.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use uuid::Uuid;

use crate::node::Node;
use crate::workflow::{Node as NodeData, NodeConfig};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("unknown node type '{type_name}'. Known types: {known}")]
    UnknownType { type_name: String, known: String },

    #[error("node type '{type_name}' is already registered")]
    AlreadyRegistered { type_name: String },

    #[error("node '{id}' of type '{type_name}' failed self-validation")]
    ValidationFailed { id: String, type_name: String },
}

/// Builds a `Node` trait object from a node's id, name, and config.
pub type NodeFactory = dyn Fn(String, String, NodeConfig) -> Arc<dyn Node> + Send + Sync;

/// Registered kind -> factory map. Lookup falls back from an exact match to
/// a case-insensitive exact match to a substring match, so a workflow
/// authored against `"http-request"` still resolves a registration under
/// `"http"` (and vice versa) without the caller needing exact-case keys.
#[derive(Default)]
pub struct Registry {
    factories: HashMap<String, Arc<NodeFactory>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `factory` under `type_name`. Overwrites any existing
    /// registration for the same key.
    pub fn register(&mut self, type_name: impl Into<String>, factory: Arc<NodeFactory>) {
        self.factories.insert(type_name.into(), factory);
    }

    /// Register `factory` under `type_name`, failing if the key is already
    /// taken instead of silently overwriting it.
    pub fn register_strict(
        &mut self,
        type_name: impl Into<String>,
        factory: Arc<NodeFactory>,
    ) -> Result<(), RegistryError> {
        let type_name = type_name.into();
        if self.factories.contains_key(&type_name) {
            return Err(RegistryError::AlreadyRegistered { type_name });
        }
        self.factories.insert(type_name, factory);
        Ok(())
    }

    fn find(&self, type_name: &str) -> Option<&Arc<NodeFactory>> {
        if let Some(factory) = self.factories.get(type_name) {
            return Some(factory);
        }

        let lower = type_name.to_ascii_lowercase();
        if let Some((_, factory)) = self
            .factories
            .iter()
            .find(|(key, _)| key.to_ascii_lowercase() == lower)
        {
            return Some(factory);
        }

        self.factories
            .iter()
            .find(|(key, _)| key.to_ascii_lowercase().contains(&lower) || lower.contains(&key.to_ascii_lowercase()))
            .map(|(_, factory)| factory)
    }

    /// Construct and self-validate a node from its workflow-declared data.
    /// A blank id defaults to a freshly generated unique token; a blank name
    /// defaults to `"<type> Node"`.
    pub fn create(&self, data: &NodeData) -> Result<Arc<dyn Node>, RegistryError> {
        let factory = self
            .find(&data.node_type)
            .ok_or_else(|| RegistryError::UnknownType {
                type_name: data.node_type.clone(),
                known: self.known_types().join(", "),
            })?;

        let id = if data.id.is_empty() {
            Uuid::new_v4().to_string()
        } else {
            data.id.clone()
        };
        let name = if data.name.is_empty() {
            format!("{} Node", data.node_type)
        } else {
            data.name.clone()
        };

        let node = factory(id.clone(), name, data.config.clone());
        if !node.validate() {
            return Err(RegistryError::ValidationFailed {
                id,
                type_name: data.node_type.clone(),
            });
        }
        Ok(node)
    }

    pub fn known_types(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }
}
