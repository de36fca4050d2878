//! Operation-based CRDT backend for the map/list document core.
//!
//! The backend resolves changes (batches of operations) into a queryable
//! document state and emits diffs describing what each application changed.
//! Callers treat the state as opaque except for the introspection surface
//! used for path resolution: object creation records, per-key winning ops,
//! the visible element-id sequence of a list, and inbound parent links.

pub mod op_set;
pub mod patch;
pub mod protocol;

pub use op_set::{OpMeta, OpSet};
pub use patch::{materialize, Diff, DiffAction, Patch};
pub use protocol::{
    ActorId, Change, ChangeRequest, Clock, ElementId, Key, ObjType, ObjectId, Op, ROOT_OBJECT_ID,
};

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("object {0} does not exist")]
    MissingObject(String),
    #[error("object {0} is not a list")]
    NotAList(String),
    #[error("object {0} is not a map")]
    NotAMap(String),
    #[error("{0} is not a valid element id")]
    InvalidElementId(String),
    #[error("element {0} was already inserted")]
    DuplicateInsertion(String),
    #[error("change {actor}:{got} arrived out of order (expected seq {expected})")]
    OutOfOrderChange {
        actor: String,
        expected: u32,
        got: u32,
    },
}
