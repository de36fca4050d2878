//! A per-schema reconstruction of the document.
//!
//! Shadows exist so path resolution and element indexing can be answered
//! against the document as a peer on that schema would see it. The engine
//! owns one primary shadow plus lazily materialized auxiliary shadows, and
//! the change converter drives discardable clones of both.

use crate::error::EngineError;
use refract_backend::{ActorId, Change, Clock, Op, OpMeta, OpSet, Patch};
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
pub struct Shadow {
    pub schema: String,
    /// Backend state; opaque except through the resolver.
    pub state: OpSet,
    /// Highest sequence number folded in per actor.
    pub clock: Clock,
    /// Dependency frontier reported by the last apply.
    pub deps: Clock,
    /// Highest element counter seen or synthesized per actor. Never
    /// decreases.
    elem: BTreeMap<ActorId, u32>,
    pub bootstrapped: bool,
}

impl Shadow {
    pub fn new(schema: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            state: OpSet::init(),
            clock: Clock::empty(),
            deps: Clock::empty(),
            elem: BTreeMap::new(),
            bootstrapped: false,
        }
    }

    pub fn max_elem(&self, actor: &ActorId) -> u32 {
        self.elem.get(actor).copied().unwrap_or(0)
    }

    pub fn bump_elem(&mut self, actor: &ActorId, elem: u32) {
        let entry = self.elem.entry(actor.clone()).or_insert(0);
        *entry = (*entry).max(elem);
    }

    fn fold_elems(&mut self, actor: &ActorId, ops: &[Op]) {
        for op in ops {
            if let Some(elem) = op.elem() {
                self.bump_elem(actor, elem);
            }
        }
    }

    /// Apply whole changes, updating clock, deps and element counters.
    pub fn apply_changes(&mut self, changes: Vec<Change>) -> Result<Patch, EngineError> {
        for change in &changes {
            self.fold_elems(&change.actor, &change.ops);
        }
        let patch = self.state.apply_changes(changes)?;
        self.clock = patch.clock.clone();
        self.deps = patch.deps.clone();
        Ok(patch)
    }

    /// Apply a locally generated change; it must be immediately ready.
    pub fn apply_local_change(&mut self, change: Change) -> Result<Patch, EngineError> {
        self.fold_elems(&change.actor, &change.ops);
        let patch = self.state.apply_local_change(change)?;
        self.clock = patch.clock.clone();
        self.deps = patch.deps.clone();
        Ok(patch)
    }

    /// Record an in-flight change before single ops are applied raw.
    pub fn begin_change(&mut self, actor: &ActorId, seq: u32, deps: &Clock) {
        self.state.register_change(actor, seq, deps);
    }

    /// Fold one op of an in-flight change into the state without clock
    /// bookkeeping. Used on the discardable clones the converter drives.
    pub fn apply_op_raw(&mut self, actor: &ActorId, seq: u32, op: &Op) -> Result<(), EngineError> {
        if let Some(elem) = op.elem() {
            self.bump_elem(actor, elem);
        }
        self.state.apply_op(
            OpMeta {
                actor: actor.clone(),
                seq,
            },
            op,
        )?;
        Ok(())
    }
}
