//! The lens graph: schema names, derived JSON-Schemas, and lens edges.

use crate::block::LensRegistration;
use crate::error::EngineError;
use refract_lenses::{empty_object_schema, reverse_lens, update_schema, LensSource};
use serde_json::Value;
use std::collections::{BTreeMap, VecDeque};

/// The name of the empty initial schema every document starts from.
pub const MU_SCHEMA: &str = "mu";

#[derive(Debug, Clone)]
pub struct LensGraph {
    /// Derived JSON-Schema per node.
    schemas: BTreeMap<String, Value>,
    /// Adjacency: node -> (neighbour, lens along that edge).
    edges: BTreeMap<String, Vec<(String, LensSource)>>,
    /// Forward registrations in insertion order, for publication in blocks.
    registrations: Vec<LensRegistration>,
}

impl Default for LensGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl LensGraph {
    pub fn new() -> Self {
        let mut schemas = BTreeMap::new();
        schemas.insert(MU_SCHEMA.to_string(), empty_object_schema());
        Self {
            schemas,
            edges: BTreeMap::new(),
            registrations: Vec::new(),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.schemas.contains_key(name)
    }

    /// The derived JSON-Schema at a node.
    pub fn schema_at(&self, name: &str) -> Result<&Value, EngineError> {
        self.schemas
            .get(name)
            .ok_or_else(|| EngineError::UnknownSchema(name.to_string()))
    }

    /// Every forward registration, in insertion order.
    pub fn registrations(&self) -> &[LensRegistration] {
        &self.registrations
    }

    /// Insert a new node and its forward and reversed edges. The source
    /// must exist, the destination must not.
    pub fn register(&mut self, reg: &LensRegistration) -> Result<(), EngineError> {
        let from_schema = self
            .schemas
            .get(&reg.from)
            .ok_or_else(|| EngineError::UnknownSchema(reg.from.clone()))?;
        if self.schemas.contains_key(&reg.to) {
            return Err(EngineError::DuplicateSchema(reg.to.clone()));
        }
        let to_schema = update_schema(from_schema, &reg.lens)?;
        self.schemas.insert(reg.to.clone(), to_schema);
        self.edges
            .entry(reg.from.clone())
            .or_default()
            .push((reg.to.clone(), reg.lens.clone()));
        self.edges
            .entry(reg.to.clone())
            .or_default()
            .push((reg.from.clone(), reverse_lens(&reg.lens)));
        self.registrations.push(reg.clone());
        Ok(())
    }

    /// The shortest edge path from one schema to another, as the ordered
    /// stack of per-edge lenses. Empty when `from == to`.
    pub fn compose(&self, from: &str, to: &str) -> Result<Vec<LensSource>, EngineError> {
        if !self.contains(from) {
            return Err(EngineError::UnknownSchema(from.to_string()));
        }
        if !self.contains(to) {
            return Err(EngineError::UnknownSchema(to.to_string()));
        }
        if from == to {
            return Ok(Vec::new());
        }
        let mut previous: BTreeMap<String, (String, LensSource)> = BTreeMap::new();
        let mut queue = VecDeque::new();
        queue.push_back(from.to_string());
        while let Some(node) = queue.pop_front() {
            if node == to {
                let mut stack = Vec::new();
                let mut cursor = to.to_string();
                while cursor != from {
                    let (parent, lens) = previous.get(&cursor).cloned().expect("traced path");
                    stack.push(lens);
                    cursor = parent;
                }
                stack.reverse();
                return Ok(stack);
            }
            for (neighbour, lens) in self.edges.get(&node).into_iter().flatten() {
                if neighbour.as_str() != from && !previous.contains_key(neighbour) {
                    previous.insert(neighbour.clone(), (node.clone(), lens.clone()));
                    queue.push_back(neighbour.clone());
                }
            }
        }
        Err(EngineError::NoLensPath {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}
