//! The lens language: a tagged edit script between two schema versions.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One version-to-version transformation, applied op by op.
pub type LensSource = Vec<LensOp>;

/// A property being added to (or removed from) an object schema.
///
/// `kind` is a JSON-Schema `type` value: a single type name or a union
/// array such as `["string", "null"]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Value>,
}

impl Property {
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: Value::String(kind.into()),
            default: None,
            items: None,
        }
    }

    /// A `string` property.
    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, "string")
    }

    /// An `object` property with no members yet (filled via `LensOp::In`).
    pub fn object(name: impl Into<String>) -> Self {
        Self::new(name, "object")
    }

    /// An array property with the given item schema fragment.
    pub fn array_of(name: impl Into<String>, items: Value) -> Self {
        let mut p = Self::new(name, "array");
        p.items = Some(items);
        p
    }

    pub fn nullable(mut self) -> Self {
        let kinds = match self.kind.take() {
            Value::String(s) => vec![Value::String(s), Value::String("null".into())],
            Value::Array(mut ks) => {
                ks.push(Value::String("null".into()));
                ks
            }
            other => vec![other],
        };
        self.kind = Value::Array(kinds);
        self
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    /// The JSON-Schema fragment this property contributes.
    pub fn to_schema(&self) -> Value {
        let mut fragment = Map::new();
        fragment.insert("type".into(), self.kind.clone());
        if let Some(items) = &self.items {
            fragment.insert("items".into(), items.clone());
        }
        if let Some(default) = &self.default {
            fragment.insert("default".into(), default.clone());
        }
        Value::Object(fragment)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum LensOp {
    /// Add a property to the object schema in scope.
    Add(Property),
    /// Remove a property. Carries the full property description so the
    /// reversed lens can re-add it.
    Remove(Property),
    /// Rename a property.
    Rename { source: String, destination: String },
    /// Pull `name` out of the nested object `host` up into scope.
    Hoist { host: String, name: String },
    /// Push `name` down into the nested object `host`.
    Plunge { host: String, name: String },
    /// Turn the scalar property `name` into a single-element array.
    Wrap { name: String },
    /// Collapse the array property `name` to its head element.
    Head { name: String },
    /// Apply a sub-lens inside the object property `name`.
    In { name: String, lens: LensSource },
    /// Apply a sub-lens to every element of the array in scope.
    Map { lens: LensSource },
}

impl LensOp {
    pub fn reverse(&self) -> LensOp {
        match self {
            LensOp::Add(p) => LensOp::Remove(p.clone()),
            LensOp::Remove(p) => LensOp::Add(p.clone()),
            LensOp::Rename {
                source,
                destination,
            } => LensOp::Rename {
                source: destination.clone(),
                destination: source.clone(),
            },
            LensOp::Hoist { host, name } => LensOp::Plunge {
                host: host.clone(),
                name: name.clone(),
            },
            LensOp::Plunge { host, name } => LensOp::Hoist {
                host: host.clone(),
                name: name.clone(),
            },
            LensOp::Wrap { name } => LensOp::Head { name: name.clone() },
            LensOp::Head { name } => LensOp::Wrap { name: name.clone() },
            LensOp::In { name, lens } => LensOp::In {
                name: name.clone(),
                lens: reverse_lens(lens),
            },
            LensOp::Map { lens } => LensOp::Map {
                lens: reverse_lens(lens),
            },
        }
    }
}

/// Structurally reverse a lens: reversed ops in reversed order.
pub fn reverse_lens(lens: &[LensOp]) -> LensSource {
    lens.iter().rev().map(LensOp::reverse).collect()
}
