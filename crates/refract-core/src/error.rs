//! Error types for the translation pipeline and engine.

use refract_backend::BackendError;
use refract_lenses::LensError;
use thiserror::Error;

/// Failures while translating a single op or patch fragment.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TranslationError {
    #[error("object {0} is not reachable from the document root")]
    UnlinkedObject(String),
    #[error("no visible element {elem} in list {obj}")]
    MissingElement { obj: String, elem: String },
    #[error("no anchor at index {index} in list {obj}")]
    MissingAnchor { obj: String, index: usize },
    #[error("parent of {0} cannot be resolved")]
    MissingParent(String),
    #[error("patch value at {0} is not a scalar, null, or empty container")]
    UnsupportedValue(String),
    #[error("patch op cannot address the document root")]
    RootAddressed,
    #[error("list key {0} is neither an element id nor an index")]
    BadListKey(String),
    #[error("insertion {0} has no reifying op in its change")]
    MissingReifier(String),
    #[error("op with action {0} cannot be translated directly")]
    UntranslatableOp(&'static str),
}

/// Failures surfaced by the engine API.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("schema {0} is not registered")]
    UnknownSchema(String),
    #[error("schema {0} is already registered")]
    DuplicateSchema(String),
    #[error("no lens path from {from} to {to}")]
    NoLensPath { from: String, to: String },
    #[error(transparent)]
    Lens(#[from] LensError),
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Translation(#[from] TranslationError),
}
