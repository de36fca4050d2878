//! Schema-migrating engine over an operation-based document store.
//!
//! Peers view one shared document through different schema versions. Every
//! change a peer receives was written under the author's schema; the engine
//! rewrites it, op by op, into the reader's schema: op -> JSON Patch ->
//! composed lens stack -> op list, resolving paths and element ids against
//! per-schema shadow instances of the document.

pub mod block;
pub mod bootstrap;
pub mod convert;
pub mod engine;
pub mod error;
pub mod graph;
pub mod resolver;
pub mod shadow;
pub mod sort;
pub mod translate;

pub use block::{Block, LensRegistration};
pub use engine::Engine;
pub use error::{EngineError, TranslationError};
pub use graph::{LensGraph, MU_SCHEMA};
pub use shadow::Shadow;

use uuid::Uuid;

/// The actor that authors every schema's synthetic defaults change.
pub const PHANTOM_ACTOR: &str = "0000000000";

/// Namespace for deterministically derived synthetic object ids.
pub const SYNTHETIC_ID_NAMESPACE: Uuid =
    Uuid::from_u128(0xf1bb7a0b_2d26_48ca_aaa3_92c63bbb5c50);
