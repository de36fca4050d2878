//! The op set resolves operations into document state.
//!
//! Changes queue until causally ready, then fold into per-object histories:
//! maps keep concurrent op sets per key, lists additionally keep the
//! insertion graph that orders elements. The winner of a key is the first
//! op of its concurrent set under descending `(seq, actor)` order.

use crate::patch::{Diff, Patch};
use crate::protocol::{ActorId, Change, Clock, ElementId, Key, ObjType, ObjectId, Op};
use crate::BackendError;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// The change an op arrived in; the concurrency tie-break orders by
/// `(seq, actor)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpMeta {
    pub actor: ActorId,
    pub seq: u32,
}

#[derive(Debug, Clone)]
struct StoredOp {
    meta: OpMeta,
    op: Op,
}

/// Transitive dependency clocks per `(actor, seq)`. A change ships only its
/// direct deps; concurrency checks need the closure.
#[derive(Debug, Clone, Default)]
struct ActorHistories(HashMap<ActorId, HashMap<u32, Clock>>);

impl ActorHistories {
    fn closure(&self, actor: &ActorId, seq: u32) -> Clock {
        self.0
            .get(actor)
            .and_then(|per_seq| per_seq.get(&seq))
            .cloned()
            .unwrap_or_default()
    }

    fn register(&mut self, actor: &ActorId, seq: u32, deps: &Clock) {
        let mut all = deps.clone();
        if seq > 1 {
            all.set_max(actor, seq - 1);
        }
        for (dep_actor, dep_seq) in deps.0.clone() {
            all = all.upper_bound(&self.closure(&dep_actor, dep_seq));
        }
        self.0.entry(actor.clone()).or_default().insert(seq, all);
    }

    fn dependency_for(&self, meta: &OpMeta, actor: &ActorId) -> u32 {
        self.closure(&meta.actor, meta.seq).seq_for(actor)
    }

    fn are_concurrent(&self, a: &OpMeta, b: &OpMeta) -> bool {
        if a.actor == b.actor && a.seq == b.seq {
            return false;
        }
        self.dependency_for(a, &b.actor) < b.seq && self.dependency_for(b, &a.actor) < a.seq
    }
}

#[derive(Debug, Clone)]
struct ObjState {
    ty: ObjType,
    /// Concurrent op sets per key (map keys or element-id labels), winner
    /// first.
    keys: BTreeMap<String, Vec<StoredOp>>,
    /// Insertion graph: anchor label -> elements inserted directly after it.
    following: BTreeMap<String, Vec<ElementId>>,
    inserted: BTreeSet<String>,
    /// The link op slot that put this object into its parent.
    inbound: Option<(ObjectId, String)>,
    max_elem: u32,
}

impl ObjState {
    fn new(ty: ObjType) -> Self {
        Self {
            ty,
            keys: BTreeMap::new(),
            following: BTreeMap::new(),
            inserted: BTreeSet::new(),
            inbound: None,
            max_elem: 0,
        }
    }

    fn winner(&self, key: &str) -> Option<&StoredOp> {
        self.keys.get(key).and_then(|slot| slot.first())
    }

    fn sorted_children(&self, anchor: &str) -> Vec<ElementId> {
        let mut children = self.following.get(anchor).cloned().unwrap_or_default();
        children.sort_by_key(|e| (e.counter().unwrap_or(0), e.actor().cloned()));
        children
    }

    /// Every inserted element in document order, visible or not.
    fn element_order(&self) -> Vec<ElementId> {
        let mut out = Vec::new();
        let mut stack = self.sorted_children("_head");
        while let Some(elem) = stack.pop() {
            let label = elem.to_string();
            out.push(elem);
            // pushed ascending so later insertions pop first
            for child in self.sorted_children(&label) {
                stack.push(child);
            }
        }
        out
    }
}

#[derive(Debug, Clone)]
pub struct OpSet {
    objects: BTreeMap<ObjectId, ObjState>,
    histories: ActorHistories,
    queue: Vec<Change>,
    clock: Clock,
    deps: Clock,
}

impl Default for OpSet {
    fn default() -> Self {
        Self::init()
    }
}

impl OpSet {
    pub fn init() -> Self {
        let mut objects = BTreeMap::new();
        objects.insert(ObjectId::root(), ObjState::new(ObjType::Map));
        Self {
            objects,
            histories: ActorHistories::default(),
            queue: Vec::new(),
            clock: Clock::empty(),
            deps: Clock::empty(),
        }
    }

    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    pub fn deps(&self) -> &Clock {
        &self.deps
    }

    /// Queue the changes and fold in everything that becomes causally
    /// ready. Already-seen `(actor, seq)` pairs are dropped.
    pub fn apply_changes(&mut self, changes: Vec<Change>) -> Result<Patch, BackendError> {
        let mut diffs = Vec::new();
        self.queue.extend(changes);
        while let Some(change) = self.pop_ready() {
            if self.clock.seq_for(&change.actor) >= change.seq {
                tracing::debug!(actor = %change.actor, seq = change.seq, "dropping duplicate change");
                continue;
            }
            self.fold_change(&change, &mut diffs)?;
        }
        Ok(self.patch_with(diffs))
    }

    /// Apply a locally generated change; it must be immediately applicable.
    pub fn apply_local_change(&mut self, change: Change) -> Result<Patch, BackendError> {
        let expected = self.clock.seq_for(&change.actor) + 1;
        if change.seq != expected {
            return Err(BackendError::OutOfOrderChange {
                actor: change.actor.to_string(),
                expected,
                got: change.seq,
            });
        }
        let mut diffs = Vec::new();
        self.fold_change(&change, &mut diffs)?;
        Ok(self.patch_with(diffs))
    }

    /// The full current state as a diff list.
    pub fn get_patch(&self) -> Patch {
        let mut diffs = Vec::new();
        self.emit_object(&ObjectId::root(), &mut diffs);
        self.patch_with(diffs)
    }

    /// Dependencies of queued changes that the state does not satisfy yet.
    pub fn get_missing_deps(&self) -> Clock {
        let mut missing = Clock::empty();
        for change in &self.queue {
            let mut needed = change.deps.clone();
            if change.seq > 1 {
                needed.set_max(&change.actor, change.seq - 1);
            }
            for (actor, seq) in &needed.0 {
                if self.clock.seq_for(actor) < *seq {
                    missing.set_max(actor, *seq);
                }
            }
        }
        missing
    }

    fn pop_ready(&mut self) -> Option<Change> {
        let position = self.queue.iter().position(|change| {
            let mut needed = change.deps.clone();
            if change.seq > 1 {
                needed.set_max(&change.actor, change.seq - 1);
            }
            needed.covered_by(&self.clock)
        })?;
        Some(self.queue.remove(position))
    }

    fn fold_change(&mut self, change: &Change, diffs: &mut Vec<Diff>) -> Result<(), BackendError> {
        self.register_change(&change.actor, change.seq, &change.deps);
        let meta = OpMeta {
            actor: change.actor.clone(),
            seq: change.seq,
        };
        for op in &change.ops {
            diffs.extend(self.apply_op(meta.clone(), op)?);
        }
        self.clock.set_max(&change.actor, change.seq);
        for (dep_actor, dep_seq) in &change.deps.0 {
            if self.deps.seq_for(dep_actor) <= *dep_seq {
                self.deps.0.remove(dep_actor);
            }
        }
        self.deps.set_max(&change.actor, change.seq);
        Ok(())
    }

    /// Record the dependency clock of an in-flight change. Required before
    /// `apply_op` is driven directly (outside `apply_changes`).
    pub fn register_change(&mut self, actor: &ActorId, seq: u32, deps: &Clock) {
        self.histories.register(actor, seq, deps);
    }

    /// Fold a single op into the state, returning the diffs it caused.
    pub fn apply_op(&mut self, meta: OpMeta, op: &Op) -> Result<Vec<Diff>, BackendError> {
        match op {
            Op::MakeMap { obj } => Ok(self.make_object(obj, ObjType::Map)),
            Op::MakeList { obj } => Ok(self.make_object(obj, ObjType::List)),
            Op::Ins { obj, key, elem } => self.apply_ins(&meta, obj, key, *elem),
            Op::Set { obj, key, value } => {
                self.apply_assign(meta, obj, key, value.clone(), false, op)
            }
            Op::Link { obj, key, value } => {
                let child = value.clone();
                if !self.objects.contains_key(&child) {
                    return Err(BackendError::MissingObject(child.to_string()));
                }
                let diffs = self.apply_assign(
                    meta,
                    obj,
                    key,
                    Value::String(child.to_string()),
                    true,
                    op,
                )?;
                if !diffs.is_empty() {
                    let parent = obj.clone();
                    let slot = key.as_str().to_string();
                    if let Some(child_state) = self.objects.get_mut(&child) {
                        child_state.inbound = Some((parent, slot));
                    }
                }
                Ok(diffs)
            }
            Op::Del { obj, key } => self.apply_del(meta, obj, key, op),
        }
    }

    fn make_object(&mut self, obj: &ObjectId, ty: ObjType) -> Vec<Diff> {
        if self.objects.contains_key(obj) {
            return Vec::new();
        }
        self.objects.insert(obj.clone(), ObjState::new(ty));
        vec![Diff::create(obj.clone(), ty)]
    }

    fn apply_ins(
        &mut self,
        meta: &OpMeta,
        obj: &ObjectId,
        anchor: &Key,
        elem: u32,
    ) -> Result<Vec<Diff>, BackendError> {
        let state = self.object_mut(obj)?;
        if state.ty != ObjType::List {
            return Err(BackendError::NotAList(obj.to_string()));
        }
        anchor.as_str().parse::<ElementId>()?;
        let label = ElementId::Id(meta.actor.clone(), elem);
        if !state.inserted.insert(label.to_string()) {
            return Err(BackendError::DuplicateInsertion(label.to_string()));
        }
        state
            .following
            .entry(anchor.as_str().to_string())
            .or_default()
            .push(label);
        state.max_elem = state.max_elem.max(elem);
        let max_elem = state.max_elem;
        Ok(vec![Diff::max_elem(obj.clone(), max_elem)])
    }

    fn apply_assign(
        &mut self,
        meta: OpMeta,
        obj: &ObjectId,
        key: &Key,
        diff_value: Value,
        link: bool,
        op: &Op,
    ) -> Result<Vec<Diff>, BackendError> {
        let histories = &self.histories;
        let state = self
            .objects
            .get_mut(obj)
            .ok_or_else(|| BackendError::MissingObject(obj.to_string()))?;
        match state.ty {
            ObjType::Map => {
                let won = incorporate(state, key.as_str(), StoredOp { meta, op: op.clone() }, histories);
                if won {
                    Ok(vec![Diff::set_key(
                        obj.clone(),
                        key.as_str().to_string(),
                        diff_value,
                        link,
                    )])
                } else {
                    Ok(Vec::new())
                }
            }
            ObjType::List => {
                key.as_str().parse::<ElementId>()?;
                let was_visible = visible_index(state, key.as_str());
                let won = incorporate(state, key.as_str(), StoredOp { meta, op: op.clone() }, histories);
                if !won {
                    return Ok(Vec::new());
                }
                let index = visible_index(state, key.as_str());
                match (was_visible, index) {
                    (Some(_), Some(index)) => Ok(vec![Diff::set_index(
                        obj.clone(),
                        index,
                        diff_value,
                        link,
                    )]),
                    (None, Some(index)) => {
                        Ok(vec![Diff::insert(obj.clone(), index, diff_value, link)])
                    }
                    _ => Ok(Vec::new()),
                }
            }
        }
    }

    fn apply_del(
        &mut self,
        meta: OpMeta,
        obj: &ObjectId,
        key: &Key,
        op: &Op,
    ) -> Result<Vec<Diff>, BackendError> {
        let histories = &self.histories;
        let state = self
            .objects
            .get_mut(obj)
            .ok_or_else(|| BackendError::MissingObject(obj.to_string()))?;
        match state.ty {
            ObjType::Map => {
                let was_visible = state.winner(key.as_str()).is_some();
                incorporate(state, key.as_str(), StoredOp { meta, op: op.clone() }, histories);
                let now_visible = state.winner(key.as_str()).is_some();
                if was_visible && !now_visible {
                    Ok(vec![Diff::remove_key(obj.clone(), key.as_str().to_string())])
                } else {
                    Ok(Vec::new())
                }
            }
            ObjType::List => {
                let index = visible_index(state, key.as_str());
                incorporate(state, key.as_str(), StoredOp { meta, op: op.clone() }, histories);
                let now = visible_index(state, key.as_str());
                match (index, now) {
                    (Some(index), None) => Ok(vec![Diff::remove_index(obj.clone(), index)]),
                    _ => Ok(Vec::new()),
                }
            }
        }
    }

    fn object_mut(&mut self, obj: &ObjectId) -> Result<&mut ObjState, BackendError> {
        self.objects
            .get_mut(obj)
            .ok_or_else(|| BackendError::MissingObject(obj.to_string()))
    }

    fn object(&self, obj: &ObjectId) -> Result<&ObjState, BackendError> {
        self.objects
            .get(obj)
            .ok_or_else(|| BackendError::MissingObject(obj.to_string()))
    }

    fn patch_with(&self, diffs: Vec<Diff>) -> Patch {
        Patch {
            diffs,
            clock: self.clock.clone(),
            deps: self.deps.clone(),
        }
    }

    fn emit_object(&self, obj: &ObjectId, diffs: &mut Vec<Diff>) {
        let Some(state) = self.objects.get(obj) else {
            return;
        };
        if !obj.is_root() {
            diffs.push(Diff::create(obj.clone(), state.ty));
        }
        match state.ty {
            ObjType::Map => {
                for (key, slot) in &state.keys {
                    if let Some(winner) = slot.first() {
                        self.emit_slot(obj, winner, diffs, |value, link| {
                            Diff::set_key(obj.clone(), key.clone(), value, link)
                        });
                    }
                }
            }
            ObjType::List => {
                let mut index = 0;
                for elem in state.element_order() {
                    let label = elem.to_string();
                    if let Some(winner) = state.winner(&label) {
                        self.emit_slot(obj, winner, diffs, |value, link| {
                            Diff::insert(obj.clone(), index, value, link)
                        });
                        index += 1;
                    }
                }
                if state.max_elem > 0 {
                    diffs.push(Diff::max_elem(obj.clone(), state.max_elem));
                }
            }
        }
    }

    fn emit_slot<F>(&self, _obj: &ObjectId, winner: &StoredOp, diffs: &mut Vec<Diff>, build: F)
    where
        F: FnOnce(Value, bool) -> Diff,
    {
        match &winner.op {
            Op::Set { value, .. } => diffs.push(build(value.clone(), false)),
            Op::Link { value, .. } => {
                self.emit_object(value, diffs);
                diffs.push(build(Value::String(value.to_string()), true));
            }
            _ => {}
        }
    }

    // --- introspection used for path resolution ---

    pub fn contains_object(&self, obj: &ObjectId) -> bool {
        self.objects.contains_key(obj)
    }

    /// The creation record of an object.
    pub fn obj_type(&self, obj: &ObjectId) -> Option<ObjType> {
        self.objects.get(obj).map(|state| state.ty)
    }

    /// The winning op currently assigned to a key, if any.
    pub fn winning_op(&self, obj: &ObjectId, key: &str) -> Option<&Op> {
        self.objects
            .get(obj)
            .and_then(|state| state.winner(key))
            .map(|stored| &stored.op)
    }

    pub fn has_visible_key(&self, obj: &ObjectId, key: &str) -> bool {
        self.winning_op(obj, key).is_some()
    }

    /// The ordered visible element-id sequence of a list.
    pub fn visible_elems(&self, obj: &ObjectId) -> Result<Vec<ElementId>, BackendError> {
        let state = self.object(obj)?;
        if state.ty != ObjType::List {
            return Err(BackendError::NotAList(obj.to_string()));
        }
        Ok(state
            .element_order()
            .into_iter()
            .filter(|elem| state.winner(&elem.to_string()).is_some())
            .collect())
    }

    /// The parent link slot that holds this object, if it is linked in.
    pub fn inbound(&self, obj: &ObjectId) -> Option<&(ObjectId, String)> {
        self.objects.get(obj).and_then(|state| state.inbound.as_ref())
    }

    pub fn max_elem_of(&self, obj: &ObjectId) -> u32 {
        self.objects.get(obj).map(|state| state.max_elem).unwrap_or(0)
    }
}

fn visible_index(state: &ObjState, label: &str) -> Option<usize> {
    let mut index = 0;
    for elem in state.element_order() {
        let current = elem.to_string();
        let visible = state.winner(&current).is_some();
        if current == label {
            return visible.then_some(index);
        }
        if visible {
            index += 1;
        }
    }
    None
}

/// Fold a new op into a key's concurrent set. Ops the new op causally
/// supersedes are dropped; deletions are not stored, so a key whose set
/// ends up empty is invisible. Returns whether the new op is now the
/// winner.
fn incorporate(
    state: &mut ObjState,
    key: &str,
    new: StoredOp,
    histories: &ActorHistories,
) -> bool {
    let slot = state.keys.entry(key.to_string()).or_default();
    let mut concurrent: Vec<StoredOp> = slot
        .iter()
        .filter(|existing| histories.are_concurrent(&existing.meta, &new.meta))
        .cloned()
        .collect();
    let new_meta = new.meta.clone();
    if matches!(new.op, Op::Set { .. } | Op::Link { .. }) {
        concurrent.push(new);
    }
    concurrent.sort_by(|a, b| {
        (b.meta.seq, &b.meta.actor).cmp(&(a.meta.seq, &a.meta.actor))
    });
    *slot = concurrent;
    slot.first()
        .map(|winner| winner.meta == new_meta)
        .unwrap_or(false)
}
