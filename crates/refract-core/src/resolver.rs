//! Mapping between object ids and JSON paths, and between list indices and
//! element ids. Read-only; callers sequence lookups against the shadow
//! state they hold.

use refract_backend::{ElementId, ObjType, ObjectId, Op, OpSet};
use refract_lenses::pointer::Segment;

/// The JSON path of an object, as segments from the root, found by
/// walking inbound links. `None` when the object (or an ancestor) is not
/// linked into the document.
pub fn path_of(state: &OpSet, obj: &ObjectId) -> Option<Vec<Segment>> {
    let mut segments = Vec::new();
    let mut cursor = obj.clone();
    while !cursor.is_root() {
        let (parent, slot) = state.inbound(&cursor)?.clone();
        match state.obj_type(&parent)? {
            ObjType::Map => segments.push(Segment::key(slot)),
            ObjType::List => {
                let elem: ElementId = slot.parse().ok()?;
                let index = index_of_elem(state, &parent, &elem)?;
                segments.push(Segment::Index(usize::try_from(index).ok()?));
            }
        }
        cursor = parent;
    }
    segments.reverse();
    Some(segments)
}

/// Descend from the root along segments to the object stored there. At a
/// list parent the segment must be an index.
pub fn obj_id_of(state: &OpSet, segments: &[Segment]) -> Option<ObjectId> {
    let mut cursor = ObjectId::root();
    for segment in segments {
        let key = match state.obj_type(&cursor)? {
            ObjType::Map => segment.key_text(),
            ObjType::List => {
                let index = segment.index()?;
                let elem = elem_of_index(state, &cursor, index as i64)?;
                elem.to_string()
            }
        };
        match state.winning_op(&cursor, &key)? {
            Op::Link { value, .. } => cursor = value.clone(),
            _ => return None,
        }
    }
    Some(cursor)
}

/// The visible index of an element; `_head` maps to `-1`.
pub fn index_of_elem(state: &OpSet, list: &ObjectId, elem: &ElementId) -> Option<i64> {
    if *elem == ElementId::Head {
        return Some(-1);
    }
    state
        .visible_elems(list)
        .ok()?
        .iter()
        .position(|e| e == elem)
        .map(|i| i as i64)
}

/// The element at a visible index; `-1` maps to `_head`.
pub fn elem_of_index(state: &OpSet, list: &ObjectId, index: i64) -> Option<ElementId> {
    if index == -1 {
        return Some(ElementId::Head);
    }
    if index < 0 {
        return None;
    }
    state.visible_elems(list).ok()?.get(index as usize).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use refract_backend::{ActorId, Change, Clock, Key};
    use serde_json::json;

    fn seeded() -> (OpSet, ObjectId, ObjectId) {
        let mut set = OpSet::init();
        let details = ObjectId("22222222-2222-2222-2222-222222222222".to_string());
        let tags = ObjectId("33333333-3333-3333-3333-333333333333".to_string());
        set.apply_changes(vec![Change {
            actor: ActorId::new("a"),
            seq: 1,
            deps: Clock::empty(),
            message: None,
            ops: vec![
                Op::MakeMap { obj: details.clone() },
                Op::Link {
                    obj: ObjectId::root(),
                    key: Key::new("details"),
                    value: details.clone(),
                },
                Op::MakeList { obj: tags.clone() },
                Op::Link {
                    obj: details.clone(),
                    key: Key::new("tags"),
                    value: tags.clone(),
                },
                Op::Ins {
                    obj: tags.clone(),
                    key: Key::new("_head"),
                    elem: 1,
                },
                Op::Set {
                    obj: tags.clone(),
                    key: Key::new("a:1"),
                    value: json!("fun"),
                },
            ],
        }])
        .unwrap();
        (set, details, tags)
    }

    #[test]
    fn paths_walk_inbound_links() {
        let (set, details, tags) = seeded();
        assert_eq!(path_of(&set, &details), Some(vec![Segment::key("details")]));
        assert_eq!(
            path_of(&set, &tags),
            Some(vec![Segment::key("details"), Segment::key("tags")])
        );
        assert_eq!(path_of(&set, &ObjectId::root()), Some(vec![]));
    }

    #[test]
    fn ids_resolve_back_from_paths() {
        let (set, details, tags) = seeded();
        assert_eq!(obj_id_of(&set, &[Segment::key("details")]), Some(details));
        assert_eq!(
            obj_id_of(&set, &[Segment::key("details"), Segment::key("tags")]),
            Some(tags)
        );
        assert_eq!(obj_id_of(&set, &[Segment::key("missing")]), None);
    }

    #[test]
    fn head_is_index_minus_one() {
        let (set, _, tags) = seeded();
        assert_eq!(index_of_elem(&set, &tags, &ElementId::Head), Some(-1));
        assert_eq!(elem_of_index(&set, &tags, -1), Some(ElementId::Head));
        assert_eq!(
            elem_of_index(&set, &tags, 0),
            Some(ElementId::Id(ActorId::new("a"), 1))
        );
        assert_eq!(elem_of_index(&set, &tags, 1), None);
    }
}
