//! The history unit exchanged between peers.

use refract_backend::{ActorId, Change};
use refract_lenses::LensSource;
use serde::{Deserialize, Serialize};

/// One edge of the lens graph, as carried inside blocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LensRegistration {
    pub from: String,
    pub to: String,
    pub lens: LensSource,
}

impl LensRegistration {
    pub fn new(from: impl Into<String>, to: impl Into<String>, lens: LensSource) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            lens,
        }
    }
}

/// A change paired with the schema its author wrote under, plus any lens
/// registrations the author believes its peers may still need. `actor` and
/// `seq` mirror the change for cheap indexing; `(actor, seq)` is the
/// block's identity for deduplication.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub schema: String,
    pub lenses: Vec<LensRegistration>,
    pub change: Change,
    pub actor: ActorId,
    pub seq: u32,
}

impl Block {
    pub fn new(schema: impl Into<String>, lenses: Vec<LensRegistration>, change: Change) -> Self {
        let actor = change.actor.clone();
        let seq = change.seq;
        Self {
            schema: schema.into(),
            lenses,
            change,
            actor,
            seq,
        }
    }
}
