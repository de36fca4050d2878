//! Wire-level protocol types: identifiers, operations, changes, clocks.

use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// The fixed identifier of the document root object.
pub const ROOT_OBJECT_ID: &str = "00000000-0000-0000-0000-000000000000";

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorId(pub String);

impl ActorId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh random actor identifier.
    pub fn random() -> Self {
        const HEX: &[u8; 16] = b"0123456789abcdef";
        let mut rng = rand::thread_rng();
        let mut out = String::with_capacity(32);
        for _ in 0..32 {
            let nibble: u8 = rng.gen_range(0..16);
            out.push(HEX[nibble as usize] as char);
        }
        Self(out)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(pub String);

impl ObjectId {
    pub fn root() -> Self {
        Self(ROOT_OBJECT_ID.to_string())
    }

    pub fn is_root(&self) -> bool {
        self.0 == ROOT_OBJECT_ID
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Whether an object was created as a map or a list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjType {
    Map,
    List,
}

/// A list element label: the insertion anchor `_head`, or `actor:counter`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ElementId {
    Head,
    Id(ActorId, u32),
}

impl ElementId {
    pub fn as_key(&self) -> Key {
        Key(self.to_string())
    }

    pub fn actor(&self) -> Option<&ActorId> {
        match self {
            ElementId::Head => None,
            ElementId::Id(actor, _) => Some(actor),
        }
    }

    pub fn counter(&self) -> Option<u32> {
        match self {
            ElementId::Head => None,
            ElementId::Id(_, elem) => Some(*elem),
        }
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementId::Head => f.write_str("_head"),
            ElementId::Id(actor, elem) => write!(f, "{}:{}", actor, elem),
        }
    }
}

impl FromStr for ElementId {
    type Err = crate::BackendError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "_head" {
            return Ok(ElementId::Head);
        }
        let (actor, elem) = s
            .rsplit_once(':')
            .ok_or_else(|| crate::BackendError::InvalidElementId(s.to_string()))?;
        let elem = elem
            .parse()
            .map_err(|_| crate::BackendError::InvalidElementId(s.to_string()))?;
        Ok(ElementId::Id(ActorId::new(actor), elem))
    }
}

/// A map key or element-id label addressing a slot inside an object.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Key(pub String);

impl Key {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The element counter when this key has `actor:counter` shape.
    pub fn elem_suffix(&self) -> Option<u32> {
        self.0.rsplit_once(':').and_then(|(_, e)| e.parse().ok())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Op {
    MakeMap {
        obj: ObjectId,
    },
    MakeList {
        obj: ObjectId,
    },
    Ins {
        obj: ObjectId,
        key: Key,
        elem: u32,
    },
    Set {
        obj: ObjectId,
        key: Key,
        value: Value,
    },
    Link {
        obj: ObjectId,
        key: Key,
        value: ObjectId,
    },
    Del {
        obj: ObjectId,
        key: Key,
    },
}

impl Op {
    pub fn obj(&self) -> &ObjectId {
        match self {
            Op::MakeMap { obj }
            | Op::MakeList { obj }
            | Op::Ins { obj, .. }
            | Op::Set { obj, .. }
            | Op::Link { obj, .. }
            | Op::Del { obj, .. } => obj,
        }
    }

    pub fn key(&self) -> Option<&Key> {
        match self {
            Op::Ins { key, .. } | Op::Set { key, .. } | Op::Link { key, .. } | Op::Del { key, .. } => {
                Some(key)
            }
            Op::MakeMap { .. } | Op::MakeList { .. } => None,
        }
    }

    pub fn elem(&self) -> Option<u32> {
        match self {
            Op::Ins { elem, .. } => Some(*elem),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Change {
    pub actor: ActorId,
    pub seq: u32,
    #[serde(default)]
    pub deps: Clock,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub ops: Vec<Op>,
}

/// A locally generated change, applied without conversion.
pub type ChangeRequest = Change;

/// Per-actor high-water marks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Clock(pub BTreeMap<ActorId, u32>);

impl Clock {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn seq_for(&self, actor: &ActorId) -> u32 {
        self.0.get(actor).copied().unwrap_or(0)
    }

    /// Raise the entry for `actor` to at least `seq`.
    pub fn set_max(&mut self, actor: &ActorId, seq: u32) {
        let entry = self.0.entry(actor.clone()).or_insert(0);
        *entry = (*entry).max(seq);
    }

    /// Whether every entry of `self` is covered by `other`.
    pub fn covered_by(&self, other: &Clock) -> bool {
        self.0.iter().all(|(actor, seq)| other.seq_for(actor) >= *seq)
    }

    pub fn upper_bound(&self, other: &Clock) -> Clock {
        let mut out = self.clone();
        for (actor, seq) in &other.0 {
            out.set_max(actor, *seq);
        }
        out
    }

    /// A copy with one actor's entry dropped.
    pub fn without(&self, actor: &ActorId) -> Clock {
        let mut out = self.clone();
        out.0.remove(actor);
        out
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn element_ids_roundtrip() {
        for raw in ["_head", "actor:1", "a:b:12"] {
            let parsed: ElementId = raw.parse().unwrap();
            assert_eq!(parsed.to_string(), raw);
        }
        assert!("nope".parse::<ElementId>().is_err());
        assert!("a:x".parse::<ElementId>().is_err());
    }

    #[test]
    fn clock_cover_and_bound() {
        let mut a = Clock::empty();
        a.set_max(&ActorId::new("x"), 2);
        let mut b = Clock::empty();
        b.set_max(&ActorId::new("x"), 3);
        b.set_max(&ActorId::new("y"), 1);
        assert!(a.covered_by(&b));
        assert!(!b.covered_by(&a));
        assert_eq!(a.upper_bound(&b), b);
    }
}
