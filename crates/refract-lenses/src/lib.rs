//! Declarative bidirectional schema lenses.
//!
//! A lens is a small, invertible edit script between two versions of a
//! JSON-Schema. Lenses are applied to JSON Patch fragments, rewriting the
//! paths and shapes an author wrote under one schema into the paths and
//! shapes a reader expects under another.

pub mod lens;
pub mod patch;
pub mod pointer;
pub mod schema;

pub use lens::{reverse_lens, LensOp, LensSource, Property};
pub use patch::{apply_lens_stack, apply_lens_to_patch, expand_patch, Patch, PatchOp};
pub use schema::{default_value, empty_object_schema, schema_at_path, update_schema};

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LensError {
    #[error("property {0} already exists in schema")]
    PropertyExists(String),
    #[error("property {0} does not exist in schema")]
    PropertyMissing(String),
    #[error("schema at {0} is not an object schema")]
    NotAnObject(String),
    #[error("schema at {0} is not an array schema")]
    NotAnArray(String),
    #[error("host and target of a plunge must differ: {0}")]
    PlungeIntoSelf(String),
    #[error(transparent)]
    Pointer(#[from] pointer::PointerError),
}
