//! Rewriting a whole change from the author's schema into another.

use crate::error::EngineError;
use crate::graph::LensGraph;
use crate::shadow::Shadow;
use crate::sort::sort_ops;
use crate::translate::{op_to_patch, patch_to_ops, ChangeCtx, ElemCache};
use refract_backend::{Change, Op};
use refract_lenses::apply_lens_stack;

/// Convert one change written under `from.schema` into `to.schema`.
///
/// Both shadows are cloned; the clones advance op by op so later ops in
/// the same change resolve paths and indices correctly, and are discarded
/// afterwards. The returned change carries the original's identity.
pub fn convert_change(
    graph: &LensGraph,
    from: &Shadow,
    to: &Shadow,
    change: &Change,
) -> Result<Change, EngineError> {
    let stack = graph.compose(&from.schema, &to.schema)?;
    let source_schema = graph.schema_at(&from.schema)?.clone();
    let sorted = sort_ops(&change.actor, &change.ops)?;

    let mut from_clone = from.clone();
    let mut to_clone = to.clone();
    from_clone.begin_change(&change.actor, change.seq, &change.deps);
    let mut cache = ElemCache::new();
    let mut ops = Vec::new();

    for (op_index, op) in sorted.iter().enumerate() {
        match op {
            Op::Ins { .. } => {
                // not emitted: the reifier's translation synthesizes its own
                // insertion on the far side
                cache.insert_ins(&change.actor, op);
                from_clone.apply_op_raw(&change.actor, change.seq, op)?;
            }
            Op::MakeMap { .. } | Op::MakeList { .. } => {
                // not emitted: the linking op's translation synthesizes the
                // container
                from_clone.apply_op_raw(&change.actor, change.seq, op)?;
            }
            _ => {
                let patch_op = op_to_patch(op, &from_clone, &cache)?;
                let (lensed, _) = apply_lens_stack(&stack, vec![patch_op], &source_schema)?;
                let ctx = ChangeCtx {
                    actor: change.actor.clone(),
                    seq: change.seq,
                    deps: change.deps.clone(),
                    op_index,
                    source_key: op.key().cloned(),
                };
                let new_ops = patch_to_ops(&lensed, &ctx, &mut to_clone)?;
                from_clone.apply_op_raw(&change.actor, change.seq, op)?;
                ops.extend(new_ops);
            }
        }
    }
    tracing::debug!(
        actor = %change.actor,
        seq = change.seq,
        from = %from.schema,
        to = %to.schema,
        ops_in = change.ops.len(),
        ops_out = ops.len(),
        "converted change"
    );
    Ok(Change {
        actor: change.actor.clone(),
        seq: change.seq,
        deps: change.deps.clone(),
        message: change.message.clone(),
        ops,
    })
}
