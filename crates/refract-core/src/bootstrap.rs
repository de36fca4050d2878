//! The one-time defaults change applied to every fresh shadow.

use crate::error::EngineError;
use crate::graph::{LensGraph, MU_SCHEMA};
use crate::shadow::Shadow;
use crate::translate::{patch_to_ops, ChangeCtx};
use crate::PHANTOM_ACTOR;
use refract_backend::{ActorId, Change, Clock, Patch};
use refract_lenses::{apply_lens_stack, PatchOp};
use serde_json::{Map, Value};

/// Build the synthetic defaults change for a schema: the universal
/// root-existence patch lensed from `mu`, minus the root op itself,
/// lowered against an empty shadow. Deterministic: every peer produces
/// the identical change.
pub fn bootstrap_change(graph: &LensGraph, schema: &str) -> Result<Change, EngineError> {
    let stack = graph.compose(MU_SCHEMA, schema)?;
    let root_patch = vec![PatchOp::Add {
        path: String::new(),
        value: Value::Object(Map::new()),
    }];
    let (mut patch, _) = apply_lens_stack(&stack, root_patch, graph.schema_at(MU_SCHEMA)?)?;
    patch.retain(|op| !op.path().is_empty());
    // containers before their contents: a plunge can move a default ahead
    // of its host's creation op
    patch.sort_by_key(|op| op.path().matches('/').count());

    let phantom = ActorId::new(PHANTOM_ACTOR);
    let mut scratch = Shadow::new(schema);
    let ctx = ChangeCtx {
        actor: phantom.clone(),
        seq: 1,
        deps: Clock::empty(),
        op_index: 0,
        source_key: None,
    };
    let ops = patch_to_ops(&patch, &ctx, &mut scratch)?;
    Ok(Change {
        actor: phantom,
        seq: 1,
        deps: Clock::empty(),
        message: Some("defaults".to_string()),
        ops,
    })
}

/// Apply the defaults change to a shadow that has not seen it yet.
pub fn ensure_bootstrapped(
    graph: &LensGraph,
    shadow: &mut Shadow,
) -> Result<Option<Patch>, EngineError> {
    if shadow.bootstrapped {
        return Ok(None);
    }
    let change = bootstrap_change(graph, &shadow.schema)?;
    tracing::debug!(schema = %shadow.schema, ops = change.ops.len(), "bootstrapping shadow");
    let patch = shadow.apply_changes(vec![change])?;
    shadow.bootstrapped = true;
    Ok(Some(patch))
}
