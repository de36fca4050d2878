//! Helpers shared by the engine integration tests. These play the role of
//! a frontend: they build op-level change requests against an engine's own
//! shadow and read documents back out of emitted patches.

use refract_backend::{materialize, ActorId, Change, ElementId, Key, ObjectId, Op};
use refract_core::resolver;
use refract_core::Engine;
use refract_lenses::pointer::Segment;
use serde_json::Value;

/// The engine's full document, as a frontend would see it.
pub fn doc_of(engine: &mut Engine) -> Value {
    materialize(&engine.get_patch().expect("get_patch").diffs)
}

/// A change request with the engine's current dependency frontier.
pub fn local_change(engine: &Engine, actor: &ActorId, seq: u32, ops: Vec<Op>) -> Change {
    Change {
        actor: actor.clone(),
        seq,
        deps: engine.primary().deps.clone(),
        message: None,
        ops,
    }
}

/// Resolve the object at a path in the engine's primary shadow.
pub fn object_at(engine: &Engine, path: &[&str]) -> ObjectId {
    let segments: Vec<Segment> = path.iter().map(|s| Segment::key(*s)).collect();
    resolver::obj_id_of(&engine.primary().state, &segments).expect("path resolves")
}

/// A `set` op on the object at `path`.
pub fn set_at(engine: &Engine, path: &[&str], key: &str, value: Value) -> Op {
    Op::Set {
        obj: object_at(engine, path),
        key: Key::new(key),
        value,
    }
}

/// Ops appending values to the list at `path`, chained after its current
/// last visible element.
pub fn push_all(engine: &Engine, actor: &ActorId, path: &[&str], values: &[Value]) -> Vec<Op> {
    let list = object_at(engine, path);
    let elems = engine
        .primary()
        .state
        .visible_elems(&list)
        .expect("list path");
    let mut anchor = elems.last().cloned().unwrap_or(ElementId::Head);
    let mut elem = engine.primary().max_elem(actor);
    let mut ops = Vec::new();
    for value in values {
        elem += 1;
        ops.push(Op::Ins {
            obj: list.clone(),
            key: anchor.as_key(),
            elem,
        });
        let label = ElementId::Id(actor.clone(), elem);
        ops.push(Op::Set {
            obj: list.clone(),
            key: label.as_key(),
            value: value.clone(),
        });
        anchor = label;
    }
    ops
}

/// A `del` op for the element at a visible list index.
pub fn del_index(engine: &Engine, path: &[&str], index: i64) -> Op {
    let list = object_at(engine, path);
    let elem = resolver::elem_of_index(&engine.primary().state, &list, index).expect("index");
    Op::Del {
        obj: list,
        key: elem.as_key(),
    }
}
