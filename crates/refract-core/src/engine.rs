//! The history-replaying engine.
//!
//! Owns the primary shadow (the reader's schema), a cache of auxiliary
//! shadows for writer schemas seen in history, the lens graph, and the
//! ordered block history. Incoming blocks written under another schema are
//! converted by materializing an up-to-date shadow of the writer's schema
//! from the history prefix and rewriting the change against it.

use crate::block::{Block, LensRegistration};
use crate::bootstrap::ensure_bootstrapped;
use crate::convert::convert_change;
use crate::error::EngineError;
use crate::graph::{LensGraph, MU_SCHEMA};
use crate::shadow::Shadow;
use crate::PHANTOM_ACTOR;
use refract_backend::{ActorId, ChangeRequest, Clock, Diff, Patch};
use std::collections::{BTreeMap, BTreeSet};

pub struct Engine {
    schema: String,
    history: Vec<Block>,
    primary: Shadow,
    /// Materialized writer-schema shadows, each with the history index it
    /// has replayed up to.
    shadows: BTreeMap<String, (Shadow, usize)>,
    graph: LensGraph,
    /// Schema names whose lenses are believed already published in the doc.
    in_doc: BTreeSet<String>,
}

impl Engine {
    /// Build an engine reading through `schema`. Fails when the lens list
    /// does not connect `mu` to the schema.
    pub fn init(schema: impl Into<String>, lenses: &[LensRegistration]) -> Result<Self, EngineError> {
        let schema = schema.into();
        let mut graph = LensGraph::new();
        for reg in lenses {
            graph.register(reg)?;
        }
        graph.compose(MU_SCHEMA, &schema)?;
        Ok(Self {
            primary: Shadow::new(&schema),
            schema,
            history: Vec::new(),
            shadows: BTreeMap::new(),
            graph,
            in_doc: BTreeSet::new(),
        })
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub fn graph(&self) -> &LensGraph {
        &self.graph
    }

    /// The primary shadow, for path and element-id introspection.
    pub fn primary(&self) -> &Shadow {
        &self.primary
    }

    pub fn history(&self) -> &[Block] {
        &self.history
    }

    /// Fold received blocks into the primary shadow, converting those
    /// written under other schemas. Blocks whose `(actor, seq)` the
    /// primary clock already covers are dropped.
    pub fn apply_blocks(&mut self, blocks: Vec<Block>) -> Result<Patch, EngineError> {
        for block in &blocks {
            self.merge_lenses(block)?;
        }
        let mut diffs = Vec::new();
        if let Some(patch) = ensure_bootstrapped(&self.graph, &mut self.primary)? {
            diffs.extend(patch.diffs);
        }
        for block in blocks {
            if block.seq <= self.primary.clock.seq_for(&block.actor) {
                tracing::debug!(actor = %block.actor, seq = block.seq, "dropping superseded block");
                continue;
            }
            self.history.push(block);
            let index = self.history.len() - 1;
            let change = {
                let block = &self.history[index];
                if block.schema == self.schema {
                    block.change.clone()
                } else {
                    let (mut from, start) = self
                        .shadows
                        .remove(&block.schema)
                        .unwrap_or_else(|| (Shadow::new(block.schema.clone()), 0));
                    replay_into(&self.graph, &self.history[..index], &mut from, start)?;
                    let translated =
                        convert_change(&self.graph, &from, &self.primary, &block.change)?;
                    self.shadows.insert(block.schema.clone(), (from, index));
                    translated
                }
            };
            let patch = self.primary.apply_changes(vec![change])?;
            diffs.extend(patch.diffs);
        }
        Ok(self.outbound(diffs))
    }

    /// Apply a locally authored change and wrap it into the block to
    /// gossip. The first local change is made to depend on the phantom
    /// defaults change; lenses are attached once per schema publication.
    pub fn apply_local_change(
        &mut self,
        request: ChangeRequest,
    ) -> Result<(Patch, Block), EngineError> {
        let mut diffs = Vec::new();
        if let Some(patch) = ensure_bootstrapped(&self.graph, &mut self.primary)? {
            diffs.extend(patch.diffs);
        }
        let mut change = request;
        if change.seq == 1 {
            change.deps.set_max(&ActorId::new(PHANTOM_ACTOR), 1);
        }
        let lenses = if self.in_doc.contains(&self.schema) {
            Vec::new()
        } else {
            for reg in self.graph.registrations() {
                self.in_doc.insert(reg.from.clone());
                self.in_doc.insert(reg.to.clone());
            }
            self.in_doc.insert(self.schema.clone());
            self.graph.registrations().to_vec()
        };
        let patch = self.primary.apply_local_change(change.clone())?;
        diffs.extend(patch.diffs);
        let block = Block::new(self.schema.clone(), lenses, change);
        self.history.push(block.clone());
        Ok((self.outbound(diffs), block))
    }

    /// The full current state, bootstrapping first if nothing forced it
    /// yet.
    pub fn get_patch(&mut self) -> Result<Patch, EngineError> {
        self.apply_blocks(Vec::new())?;
        let full = self.primary.state.get_patch();
        Ok(self.outbound(full.diffs))
    }

    /// History the given clock has not seen.
    pub fn get_missing_changes(&self, clock: &Clock) -> Vec<Block> {
        self.history
            .iter()
            .filter(|block| block.seq > clock.seq_for(&block.actor))
            .cloned()
            .collect()
    }

    pub fn get_missing_deps(&self) -> Clock {
        self.primary
            .state
            .get_missing_deps()
            .without(&ActorId::new(PHANTOM_ACTOR))
    }

    /// Apply everything the remote engine has that this one lacks.
    pub fn merge(&mut self, remote: &Engine) -> Result<Patch, EngineError> {
        let missing = remote.get_missing_changes(&self.primary.clock);
        self.apply_blocks(missing)
    }

    fn merge_lenses(&mut self, block: &Block) -> Result<(), EngineError> {
        for reg in &block.lenses {
            if !self.graph.contains(&reg.to) {
                self.graph.register(reg)?;
            }
            self.in_doc.insert(reg.from.clone());
            self.in_doc.insert(reg.to.clone());
        }
        Ok(())
    }

    /// Patches leaving the engine never expose the phantom actor.
    fn outbound(&self, diffs: Vec<Diff>) -> Patch {
        let phantom = ActorId::new(PHANTOM_ACTOR);
        Patch {
            diffs,
            clock: self.primary.clock.without(&phantom),
            deps: self.primary.deps.without(&phantom),
        }
    }
}

/// Replay `history[start..]` into a shadow of some writer schema,
/// bootstrapping it first and converting blocks of other schemas through
/// fresh recursively materialized shadows.
fn replay_into(
    graph: &LensGraph,
    history: &[Block],
    shadow: &mut Shadow,
    start: usize,
) -> Result<(), EngineError> {
    ensure_bootstrapped(graph, shadow)?;
    for index in start..history.len() {
        let block = &history[index];
        if block.seq <= shadow.clock.seq_for(&block.actor) {
            continue;
        }
        let change = if block.schema == shadow.schema {
            block.change.clone()
        } else {
            let mut from = Shadow::new(block.schema.clone());
            replay_into(graph, &history[..index], &mut from, 0)?;
            convert_change(graph, &from, shadow, &block.change)?
        };
        shadow.apply_changes(vec![change])?;
    }
    Ok(())
}
