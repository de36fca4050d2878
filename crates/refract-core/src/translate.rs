//! Translation between single ops and JSON Patch fragments.
//!
//! Forward: an op plus the shadow it was written against becomes one patch
//! op. Reverse: a lensed patch fragment becomes an ordered op list for the
//! target shadow, synthesizing `makeMap`/`makeList`/`ins` as needed.

use crate::error::{EngineError, TranslationError};
use crate::resolver::{elem_of_index, index_of_elem, obj_id_of, path_of};
use crate::shadow::Shadow;
use crate::SYNTHETIC_ID_NAMESPACE;
use refract_backend::{ActorId, Clock, ElementId, Key, ObjType, ObjectId, Op};
use refract_lenses::pointer::{format_pointer, parse_pointer, Segment};
use refract_lenses::{LensError, PatchOp};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

/// Insertions made earlier in the current change, keyed by the element
/// label they create. A `set`/`link` whose key is cached reifies that
/// insertion rather than overwriting an existing element.
#[derive(Debug, Default)]
pub struct ElemCache(HashMap<String, Op>);

impl ElemCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_ins(&mut self, actor: &ActorId, op: &Op) {
        if let Op::Ins { elem, .. } = op {
            self.0.insert(format!("{}:{}", actor, elem), op.clone());
        }
    }

    fn get(&self, key: &str) -> Option<&Op> {
        self.0.get(key)
    }
}

/// The change a patch fragment originated from, as the reverse translation
/// needs it: identity for synthetic ids, deps for backend registration,
/// and the original op's key for element-counter reuse.
#[derive(Debug, Clone)]
pub struct ChangeCtx {
    pub actor: ActorId,
    pub seq: u32,
    pub deps: Clock,
    pub op_index: usize,
    pub source_key: Option<Key>,
}

/// Deterministic id for an object synthesized while lowering a patch op:
/// every peer derives the same id for the same `(actor, seq, opIndex,
/// patchIndex)`.
pub fn synthetic_object_id(ctx: &ChangeCtx, patch_index: usize) -> ObjectId {
    let name = format!("{}:{}:{}:{}", ctx.actor, ctx.seq, ctx.op_index, patch_index);
    ObjectId(Uuid::new_v5(&SYNTHETIC_ID_NAMESPACE, name.as_bytes()).to_string())
}

/// Translate one op into the patch op it denotes under the given shadow.
///
/// `ins` and `make*` never reach this function; the change converter
/// pre-handles them.
pub fn op_to_patch(
    op: &Op,
    shadow: &Shadow,
    cache: &ElemCache,
) -> Result<PatchOp, TranslationError> {
    match op {
        Op::Set { obj, key, value } => assign_patch(shadow, cache, obj, key, value.clone()),
        Op::Link { obj, key, value } => {
            let container = match shadow.state.obj_type(value) {
                Some(ObjType::Map) => Value::Object(Default::default()),
                Some(ObjType::List) => Value::Array(Default::default()),
                None => return Err(TranslationError::UnlinkedObject(value.to_string())),
            };
            assign_patch(shadow, cache, obj, key, container)
        }
        Op::Del { obj, key } => {
            let mut segments = path_of(&shadow.state, obj)
                .ok_or_else(|| TranslationError::UnlinkedObject(obj.to_string()))?;
            match shadow.state.obj_type(obj) {
                Some(ObjType::List) => {
                    let elem: ElementId = key
                        .as_str()
                        .parse()
                        .map_err(|_| TranslationError::BadListKey(key.as_str().to_string()))?;
                    let index = index_of_elem(&shadow.state, obj, &elem).ok_or_else(|| {
                        TranslationError::MissingElement {
                            obj: obj.to_string(),
                            elem: key.as_str().to_string(),
                        }
                    })?;
                    segments.push(Segment::Index(index as usize));
                }
                _ => segments.push(Segment::key(key.as_str())),
            }
            Ok(PatchOp::Remove {
                path: format_pointer(&segments),
            })
        }
        Op::MakeMap { .. } => Err(TranslationError::UntranslatableOp("makeMap")),
        Op::MakeList { .. } => Err(TranslationError::UntranslatableOp("makeList")),
        Op::Ins { .. } => Err(TranslationError::UntranslatableOp("ins")),
    }
}

fn assign_patch(
    shadow: &Shadow,
    cache: &ElemCache,
    obj: &ObjectId,
    key: &Key,
    value: Value,
) -> Result<PatchOp, TranslationError> {
    let mut segments = path_of(&shadow.state, obj)
        .ok_or_else(|| TranslationError::UnlinkedObject(obj.to_string()))?;
    match shadow.state.obj_type(obj) {
        Some(ObjType::List) => {
            if let Some(ins) = cache.get(key.as_str()) {
                // insert-after: the placeholder was ins'd earlier in this
                // change, anchored on the op's own key
                let anchor: ElementId = ins
                    .key()
                    .map(|k| k.as_str().parse())
                    .transpose()
                    .map_err(|_| TranslationError::BadListKey(key.as_str().to_string()))?
                    .ok_or_else(|| TranslationError::BadListKey(key.as_str().to_string()))?;
                let anchor_index =
                    index_of_elem(&shadow.state, obj, &anchor).ok_or_else(|| {
                        TranslationError::MissingElement {
                            obj: obj.to_string(),
                            elem: anchor.to_string(),
                        }
                    })?;
                segments.push(Segment::Index((anchor_index + 1) as usize));
                Ok(PatchOp::Add {
                    path: format_pointer(&segments),
                    value,
                })
            } else {
                let elem: ElementId = key
                    .as_str()
                    .parse()
                    .map_err(|_| TranslationError::BadListKey(key.as_str().to_string()))?;
                let index = index_of_elem(&shadow.state, obj, &elem).ok_or_else(|| {
                    TranslationError::MissingElement {
                        obj: obj.to_string(),
                        elem: key.as_str().to_string(),
                    }
                })?;
                segments.push(Segment::Index(index as usize));
                Ok(PatchOp::Replace {
                    path: format_pointer(&segments),
                    value,
                })
            }
        }
        _ => {
            let exists = shadow.state.has_visible_key(obj, key.as_str());
            segments.push(Segment::key(key.as_str()));
            let path = format_pointer(&segments);
            if exists {
                Ok(PatchOp::Replace { path, value })
            } else {
                Ok(PatchOp::Add { path, value })
            }
        }
    }
}

/// Lower a lensed patch into ops against the target shadow, applying each
/// fragment's ops to the shadow as it goes so later fragments resolve
/// paths and indices correctly. The path cache carries objects created
/// earlier in the same patch.
pub fn patch_to_ops(
    patch: &[PatchOp],
    ctx: &ChangeCtx,
    to: &mut Shadow,
) -> Result<Vec<Op>, EngineError> {
    to.begin_change(&ctx.actor, ctx.seq, &ctx.deps);
    let mut path_cache: HashMap<String, ObjectId> = HashMap::new();
    path_cache.insert(String::new(), ObjectId::root());
    let mut out = Vec::new();
    for (patch_index, patch_op) in patch.iter().enumerate() {
        let ops = lower_patch_op(patch_op, patch_index, ctx, to, &path_cache)?;
        for op in &ops {
            to.apply_op_raw(&ctx.actor, ctx.seq, op)?;
            if let Op::Link { value, .. } = op {
                path_cache.insert(patch_op.path().to_string(), value.clone());
            }
        }
        out.extend(ops);
    }
    Ok(out)
}

fn lower_patch_op(
    patch_op: &PatchOp,
    patch_index: usize,
    ctx: &ChangeCtx,
    to: &Shadow,
    path_cache: &HashMap<String, ObjectId>,
) -> Result<Vec<Op>, EngineError> {
    let segments = parse_pointer(patch_op.path()).map_err(LensError::from)?;
    if segments.is_empty() {
        return Err(TranslationError::RootAddressed.into());
    }
    let slot = segments.last().expect("non-empty path").clone();
    let parent_segments = &segments[..segments.len() - 1];
    let parent = path_cache
        .get(&format_pointer(parent_segments))
        .cloned()
        .or_else(|| obj_id_of(&to.state, parent_segments))
        .ok_or_else(|| TranslationError::MissingParent(patch_op.path().to_string()))?;
    let parent_ty = to
        .state
        .obj_type(&parent)
        .ok_or_else(|| TranslationError::MissingParent(patch_op.path().to_string()))?;
    match parent_ty {
        ObjType::Map => lower_map_slot(patch_op, patch_index, ctx, parent, &slot),
        ObjType::List => lower_list_slot(patch_op, patch_index, ctx, to, parent, &slot),
    }
}

fn lower_map_slot(
    patch_op: &PatchOp,
    patch_index: usize,
    ctx: &ChangeCtx,
    parent: ObjectId,
    slot: &Segment,
) -> Result<Vec<Op>, EngineError> {
    let key = Key::new(slot.key_text());
    match patch_op {
        PatchOp::Remove { .. } => Ok(vec![Op::Del { obj: parent, key }]),
        PatchOp::Add { value, .. } | PatchOp::Replace { value, .. } => {
            match container_kind(value, patch_op.path())? {
                Some(make) => {
                    let id = synthetic_object_id(ctx, patch_index);
                    Ok(vec![
                        make(id.clone()),
                        Op::Link {
                            obj: parent,
                            key,
                            value: id,
                        },
                    ])
                }
                None => Ok(vec![Op::Set {
                    obj: parent,
                    key,
                    value: value.clone(),
                }]),
            }
        }
    }
}

fn lower_list_slot(
    patch_op: &PatchOp,
    patch_index: usize,
    ctx: &ChangeCtx,
    to: &Shadow,
    parent: ObjectId,
    slot: &Segment,
) -> Result<Vec<Op>, EngineError> {
    let index = slot
        .index()
        .ok_or_else(|| TranslationError::BadListKey(slot.to_string()))?;
    match patch_op {
        PatchOp::Add { value, .. } => {
            let anchor = elem_of_index(&to.state, &parent, index as i64 - 1).ok_or_else(|| {
                TranslationError::MissingAnchor {
                    obj: parent.to_string(),
                    index,
                }
            })?;
            let elem = next_elem(ctx, to);
            let elem_key = Key::new(format!("{}:{}", ctx.actor, elem));
            let ins = Op::Ins {
                obj: parent.clone(),
                key: anchor.as_key(),
                elem,
            };
            match container_kind(value, patch_op.path())? {
                Some(make) => {
                    let id = synthetic_object_id(ctx, patch_index);
                    Ok(vec![
                        make(id.clone()),
                        ins,
                        Op::Link {
                            obj: parent,
                            key: elem_key,
                            value: id,
                        },
                    ])
                }
                None => Ok(vec![
                    ins,
                    Op::Set {
                        obj: parent,
                        key: elem_key,
                        value: value.clone(),
                    },
                ]),
            }
        }
        PatchOp::Replace { value, .. } => {
            let Some(elem) = elem_of_index(&to.state, &parent, index as i64) else {
                // overwrite of an index this side does not have
                tracing::debug!(list = %parent, index, "dropping replace of missing index");
                return Ok(Vec::new());
            };
            match container_kind(value, patch_op.path())? {
                Some(make) => {
                    let id = synthetic_object_id(ctx, patch_index);
                    Ok(vec![
                        make(id.clone()),
                        Op::Link {
                            obj: parent,
                            key: elem.as_key(),
                            value: id,
                        },
                    ])
                }
                None => Ok(vec![Op::Set {
                    obj: parent,
                    key: elem.as_key(),
                    value: value.clone(),
                }]),
            }
        }
        PatchOp::Remove { .. } => match elem_of_index(&to.state, &parent, index as i64) {
            Some(elem) => Ok(vec![Op::Del {
                obj: parent,
                key: elem.as_key(),
            }]),
            None => {
                tracing::debug!(list = %parent, index, "dropping remove of missing index");
                Ok(Vec::new())
            }
        },
    }
}

/// The element counter for a synthesized insertion: the writer's original
/// counter when it is still ahead of the target shadow, otherwise the next
/// free counter. Either way the shadow's `elem[actor]` strictly increases.
fn next_elem(ctx: &ChangeCtx, to: &Shadow) -> u32 {
    let current = to.max_elem(&ctx.actor);
    match ctx.source_key.as_ref().and_then(Key::elem_suffix) {
        Some(suffix) if suffix > current => suffix,
        _ => current + 1,
    }
}

type MakeFn = fn(ObjectId) -> Op;

fn container_kind(value: &Value, path: &str) -> Result<Option<MakeFn>, EngineError> {
    match value {
        Value::Object(members) if members.is_empty() => {
            Ok(Some(|obj| Op::MakeMap { obj }))
        }
        Value::Array(items) if items.is_empty() => Ok(Some(|obj| Op::MakeList { obj })),
        Value::Object(_) | Value::Array(_) => {
            Err(TranslationError::UnsupportedValue(path.to_string()).into())
        }
        _ => Ok(None),
    }
}
