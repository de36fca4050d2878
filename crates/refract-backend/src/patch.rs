//! Diffs emitted by the backend and a frontend-shaped materializer.

use crate::protocol::{Clock, ObjType, ObjectId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DiffAction {
    Create,
    Set,
    Insert,
    Remove,
    MaxElem,
}

/// One observable consequence of applying an op.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diff {
    pub action: DiffAction,
    pub obj: ObjectId,
    #[serde(rename = "type")]
    pub obj_type: ObjType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub link: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl Diff {
    pub fn create(obj: ObjectId, obj_type: ObjType) -> Self {
        Self {
            action: DiffAction::Create,
            obj,
            obj_type,
            key: None,
            index: None,
            value: None,
            link: false,
        }
    }

    pub fn set_key(obj: ObjectId, key: String, value: Value, link: bool) -> Self {
        Self {
            action: DiffAction::Set,
            obj,
            obj_type: ObjType::Map,
            key: Some(key),
            index: None,
            value: Some(value),
            link,
        }
    }

    pub fn set_index(obj: ObjectId, index: usize, value: Value, link: bool) -> Self {
        Self {
            action: DiffAction::Set,
            obj,
            obj_type: ObjType::List,
            key: None,
            index: Some(index),
            value: Some(value),
            link,
        }
    }

    pub fn insert(obj: ObjectId, index: usize, value: Value, link: bool) -> Self {
        Self {
            action: DiffAction::Insert,
            obj,
            obj_type: ObjType::List,
            key: None,
            index: Some(index),
            value: Some(value),
            link,
        }
    }

    pub fn remove_key(obj: ObjectId, key: String) -> Self {
        Self {
            action: DiffAction::Remove,
            obj,
            obj_type: ObjType::Map,
            key: Some(key),
            index: None,
            value: None,
            link: false,
        }
    }

    pub fn remove_index(obj: ObjectId, index: usize) -> Self {
        Self {
            action: DiffAction::Remove,
            obj,
            obj_type: ObjType::List,
            key: None,
            index: Some(index),
            value: None,
            link: false,
        }
    }

    pub fn max_elem(obj: ObjectId, value: u32) -> Self {
        Self {
            action: DiffAction::MaxElem,
            obj,
            obj_type: ObjType::List,
            key: None,
            index: None,
            value: Some(Value::from(value)),
            link: false,
        }
    }
}

/// What an application of changes produced, as seen by a frontend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patch {
    pub diffs: Vec<Diff>,
    pub clock: Clock,
    pub deps: Clock,
}

impl Patch {
    pub fn empty() -> Self {
        Self {
            diffs: Vec::new(),
            clock: Clock::empty(),
            deps: Clock::empty(),
        }
    }
}

enum MatCell {
    Value(Value),
    Ref(ObjectId),
}

enum MatNode {
    Map(BTreeMap<String, MatCell>),
    List(Vec<MatCell>),
}

/// Fold a diff list into the document value it describes.
///
/// Works for full-state diff lists and for incremental streams replayed
/// from an empty document.
pub fn materialize(diffs: &[Diff]) -> Value {
    let mut nodes: BTreeMap<ObjectId, MatNode> = BTreeMap::new();
    nodes.insert(ObjectId::root(), MatNode::Map(BTreeMap::new()));
    for diff in diffs {
        match diff.action {
            DiffAction::Create => {
                nodes.entry(diff.obj.clone()).or_insert_with(|| match diff.obj_type {
                    ObjType::Map => MatNode::Map(BTreeMap::new()),
                    ObjType::List => MatNode::List(Vec::new()),
                });
            }
            DiffAction::Set => {
                let cell = cell_of(diff);
                match nodes.get_mut(&diff.obj) {
                    Some(MatNode::Map(map)) => {
                        if let Some(key) = &diff.key {
                            map.insert(key.clone(), cell);
                        }
                    }
                    Some(MatNode::List(items)) => {
                        if let Some(index) = diff.index {
                            if index < items.len() {
                                items[index] = cell;
                            }
                        }
                    }
                    None => {}
                }
            }
            DiffAction::Insert => {
                if let (Some(MatNode::List(items)), Some(index)) =
                    (nodes.get_mut(&diff.obj), diff.index)
                {
                    let index = index.min(items.len());
                    items.insert(index, cell_of(diff));
                }
            }
            DiffAction::Remove => match nodes.get_mut(&diff.obj) {
                Some(MatNode::Map(map)) => {
                    if let Some(key) = &diff.key {
                        map.remove(key);
                    }
                }
                Some(MatNode::List(items)) => {
                    if let Some(index) = diff.index {
                        if index < items.len() {
                            items.remove(index);
                        }
                    }
                }
                None => {}
            },
            DiffAction::MaxElem => {}
        }
    }
    resolve(&nodes, &ObjectId::root())
}

fn cell_of(diff: &Diff) -> MatCell {
    let value = diff.value.clone().unwrap_or(Value::Null);
    if diff.link {
        match value {
            Value::String(id) => MatCell::Ref(ObjectId(id)),
            _ => MatCell::Value(Value::Null),
        }
    } else {
        MatCell::Value(value)
    }
}

fn resolve(nodes: &BTreeMap<ObjectId, MatNode>, obj: &ObjectId) -> Value {
    match nodes.get(obj) {
        Some(MatNode::Map(map)) => {
            let mut out = Map::new();
            for (key, cell) in map {
                out.insert(key.clone(), resolve_cell(nodes, cell));
            }
            Value::Object(out)
        }
        Some(MatNode::List(items)) => {
            Value::Array(items.iter().map(|c| resolve_cell(nodes, c)).collect())
        }
        None => Value::Null,
    }
}

fn resolve_cell(nodes: &BTreeMap<ObjectId, MatNode>, cell: &MatCell) -> Value {
    match cell {
        MatCell::Value(v) => v.clone(),
        MatCell::Ref(id) => resolve(nodes, id),
    }
}
