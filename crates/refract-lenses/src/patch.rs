//! JSON Patch fragments and their transformation through lenses.
//!
//! The pipeline mirrors the shape of the schema updater: a patch is first
//! expanded so every op writes a scalar or an empty container, then each op
//! is folded through the lens, and finally default values are filled in for
//! any container the patch creates.

use crate::lens::{LensOp, LensSource};
use crate::pointer::{format_pointer, parse_pointer, Segment};
use crate::schema::{default_value, schema_at_path, update_schema};
use crate::LensError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub type Patch = Vec<PatchOp>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum PatchOp {
    Add { path: String, value: Value },
    Replace { path: String, value: Value },
    Remove { path: String },
}

impl PatchOp {
    pub fn path(&self) -> &str {
        match self {
            PatchOp::Add { path, .. }
            | PatchOp::Replace { path, .. }
            | PatchOp::Remove { path } => path,
        }
    }

    pub fn value(&self) -> Option<&Value> {
        match self {
            PatchOp::Add { value, .. } | PatchOp::Replace { value, .. } => Some(value),
            PatchOp::Remove { .. } => None,
        }
    }

    fn with_path(&self, path: String) -> PatchOp {
        match self {
            PatchOp::Add { value, .. } => PatchOp::Add { path, value: value.clone() },
            PatchOp::Replace { value, .. } => PatchOp::Replace { path, value: value.clone() },
            PatchOp::Remove { .. } => PatchOp::Remove { path },
        }
    }

    fn with_value(&self, value: Value) -> PatchOp {
        match self {
            PatchOp::Add { path, .. } => PatchOp::Add { path: path.clone(), value },
            PatchOp::Replace { path, .. } => PatchOp::Replace { path: path.clone(), value },
            PatchOp::Remove { path } => PatchOp::Remove { path: path.clone() },
        }
    }
}

fn child_path(base: &str, segment: Segment) -> String {
    let mut out = base.to_string();
    out.push_str(&format_pointer(&[segment]));
    out
}

/// Expand an op writing a populated container into a container-creation op
/// followed by one op per member, depth first.
pub fn expand_patch(op: &PatchOp) -> Vec<PatchOp> {
    match op.value() {
        Some(Value::Object(members)) if !members.is_empty() => {
            let mut out = vec![op.with_value(Value::Object(Map::new()))];
            for (name, value) in members {
                out.extend(expand_patch(&PatchOp::Add {
                    path: child_path(op.path(), Segment::key(name.as_str())),
                    value: value.clone(),
                }));
            }
            out
        }
        Some(Value::Array(items)) if !items.is_empty() => {
            let mut out = vec![op.with_value(Value::Array(Vec::new()))];
            for (index, value) in items.iter().enumerate() {
                out.extend(expand_patch(&PatchOp::Add {
                    path: child_path(op.path(), Segment::Index(index)),
                    value: value.clone(),
                }));
            }
            out
        }
        _ => vec![op.clone()],
    }
}

/// Fold one patch op through a whole lens. `None` means the op has no
/// meaning on the far side and is dropped.
fn apply_lens_to_op(lens: &[LensOp], op: PatchOp) -> Result<Option<PatchOp>, LensError> {
    let mut current = op;
    for lens_op in lens {
        match apply_lens_op(lens_op, current)? {
            Some(next) => current = next,
            None => return Ok(None),
        }
    }
    Ok(Some(current))
}

fn apply_lens_op(lens_op: &LensOp, op: PatchOp) -> Result<Option<PatchOp>, LensError> {
    let segments = parse_pointer(op.path())?;
    let head = segments.first().and_then(Segment::as_key);
    Ok(match lens_op {
        LensOp::Add(_) => Some(op),
        LensOp::Remove(p) => {
            if head == Some(p.name.as_str()) {
                None
            } else {
                Some(op)
            }
        }
        LensOp::Rename {
            source,
            destination,
        } => {
            if head == Some(source.as_str()) {
                let mut segments = segments;
                segments[0] = Segment::key(destination.as_str());
                Some(op.with_path(format_pointer(&segments)))
            } else {
                Some(op)
            }
        }
        LensOp::Hoist { host, name } => {
            if head == Some(host.as_str())
                && segments.get(1).and_then(Segment::as_key) == Some(name.as_str())
            {
                Some(op.with_path(format_pointer(&segments[1..])))
            } else {
                Some(op)
            }
        }
        LensOp::Plunge { host, name } => {
            if head == Some(name.as_str()) {
                let mut segments = segments;
                segments.insert(0, Segment::key(host.as_str()));
                Some(op.with_path(format_pointer(&segments)))
            } else {
                Some(op)
            }
        }
        LensOp::Wrap { name } => {
            if head != Some(name.as_str()) {
                return Ok(Some(op));
            }
            let mut segments = segments;
            if segments.len() == 1 {
                segments.push(Segment::Index(0));
                let head_path = format_pointer(&segments);
                match &op {
                    PatchOp::Remove { .. } => Some(PatchOp::Remove { path: head_path }),
                    _ if op.value() == Some(&Value::Null) => {
                        Some(PatchOp::Remove { path: head_path })
                    }
                    _ => Some(op.with_path(head_path)),
                }
            } else {
                segments.insert(1, Segment::Index(0));
                Some(op.with_path(format_pointer(&segments)))
            }
        }
        LensOp::Head { name } => {
            if head != Some(name.as_str()) {
                return Ok(Some(op));
            }
            if segments.len() == 1 {
                // a write of the whole array resets the scalar
                match op {
                    PatchOp::Remove { path } => Some(PatchOp::Remove { path }),
                    other => Some(PatchOp::Replace {
                        path: other.path().to_string(),
                        value: Value::Null,
                    }),
                }
            } else if segments[1] == Segment::Index(0) {
                let mut segments = segments;
                segments.remove(1);
                if segments.len() == 1 && matches!(op, PatchOp::Remove { .. }) {
                    // shifting the head exposes no value on the scalar side
                    Some(PatchOp::Replace {
                        path: format_pointer(&segments),
                        value: Value::Null,
                    })
                } else {
                    Some(op.with_path(format_pointer(&segments)))
                }
            } else {
                // writes past the head are invisible to the scalar side
                None
            }
        }
        LensOp::In { name, lens } => {
            if head == Some(name.as_str()) && segments.len() > 1 {
                let inner = op.with_path(format_pointer(&segments[1..]));
                apply_lens_to_op(lens, inner)?.map(|inner| {
                    inner.with_path(child_path("", Segment::key(name.as_str())) + inner.path())
                })
            } else {
                Some(op)
            }
        }
        LensOp::Map { lens } => {
            if let Some(index) = segments.first().and_then(Segment::index) {
                let inner = op.with_path(format_pointer(&segments[1..]));
                apply_lens_to_op(lens, inner)?.map(|inner| {
                    inner.with_path(child_path("", Segment::Index(index)) + inner.path())
                })
            } else {
                Some(op)
            }
        }
    })
}

/// Emit default-value writes for every property of an object schema,
/// containers before their contents, skipping paths already written.
fn default_fill(
    base_path: &str,
    schema: &Value,
    seen: &mut std::collections::BTreeSet<String>,
    out: &mut Vec<PatchOp>,
) {
    let Some(props) = schema.get("properties").and_then(Value::as_object) else {
        return;
    };
    for (name, fragment) in props {
        let path = child_path(base_path, Segment::key(name.as_str()));
        if !seen.insert(path.clone()) {
            continue;
        }
        let default = default_value(fragment);
        match default {
            Value::Object(_) => {
                out.push(PatchOp::Add {
                    path: path.clone(),
                    value: Value::Object(Map::new()),
                });
                default_fill(&path, fragment, seen, out);
            }
            Value::Array(items) if items.is_empty() => {
                out.push(PatchOp::Add {
                    path,
                    value: Value::Array(Vec::new()),
                });
            }
            Value::Array(items) => {
                out.push(PatchOp::Add {
                    path: path.clone(),
                    value: Value::Array(Vec::new()),
                });
                for (index, item) in items.into_iter().enumerate() {
                    let item_path = child_path(&path, Segment::Index(index));
                    seen.insert(item_path.clone());
                    for op in expand_patch(&PatchOp::Add {
                        path: item_path,
                        value: item,
                    }) {
                        out.push(op);
                    }
                }
            }
            scalar => out.push(PatchOp::Add { path, value: scalar }),
        }
    }
}

/// Apply one lens to a patch written under `source_schema`.
///
/// Returns the rewritten patch together with the destination schema.
pub fn apply_lens_to_patch(
    lens: &[LensOp],
    patch: &[PatchOp],
    source_schema: &Value,
) -> Result<(Patch, Value), LensError> {
    let expanded: Vec<PatchOp> = patch.iter().flat_map(expand_patch).collect();
    let mut lensed = Vec::with_capacity(expanded.len());
    for op in expanded {
        if let Some(op) = apply_lens_to_op(lens, op)? {
            lensed.push(op);
        }
    }
    let target_schema = update_schema(source_schema, lens)?;

    // Fill defaults for containers this patch creates. Paths the patch
    // already writes (anywhere in it) are not defaulted a second time.
    let mut seen: std::collections::BTreeSet<String> =
        lensed.iter().map(|op| op.path().to_string()).collect();
    let mut out = Vec::with_capacity(lensed.len());
    for op in lensed {
        let creates_object = matches!(
            &op,
            PatchOp::Add { value, .. } | PatchOp::Replace { value, .. }
                if matches!(value, Value::Object(m) if m.is_empty())
        );
        let path = op.path().to_string();
        out.push(op);
        if creates_object {
            if let Ok(segments) = parse_pointer(&path) {
                if let Some(node) = schema_at_path(&target_schema, &segments) {
                    default_fill(&path, node, &mut seen, &mut out);
                }
            }
        }
    }
    Ok((out, target_schema))
}

/// Apply a stack of lenses edge by edge, threading the intermediate
/// schemas so defaults introduced early flow through later edges.
pub fn apply_lens_stack(
    stack: &[LensSource],
    patch: Patch,
    source_schema: &Value,
) -> Result<(Patch, Value), LensError> {
    let mut patch = patch;
    let mut schema = source_schema.clone();
    for lens in stack {
        let (next_patch, next_schema) = apply_lens_to_patch(lens, &patch, &schema)?;
        patch = next_patch;
        schema = next_schema;
    }
    Ok((patch, schema))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lens::Property;
    use crate::schema::empty_object_schema;
    use serde_json::json;

    #[test]
    fn expands_nested_containers() {
        let op = PatchOp::Add {
            path: "/a".into(),
            value: json!({ "b": 1, "c": [true] }),
        };
        assert_eq!(
            expand_patch(&op),
            vec![
                PatchOp::Add { path: "/a".into(), value: json!({}) },
                PatchOp::Add { path: "/a/b".into(), value: json!(1) },
                PatchOp::Add { path: "/a/c".into(), value: json!([]) },
                PatchOp::Add { path: "/a/c/0".into(), value: json!(true) },
            ]
        );
    }

    #[test]
    fn rename_rewrites_only_the_head_segment() {
        let lens = vec![LensOp::Rename {
            source: "name".into(),
            destination: "title".into(),
        }];
        let op = apply_lens_to_op(&lens, PatchOp::Replace { path: "/name".into(), value: json!("x") })
            .unwrap()
            .unwrap();
        assert_eq!(op.path(), "/title");
    }

    #[test]
    fn wrap_and_head_translate_scalar_writes() {
        let wrap = vec![LensOp::Wrap { name: "assignee".into() }];
        let op = apply_lens_to_op(
            &wrap,
            PatchOp::Replace { path: "/assignee".into(), value: json!("Joe") },
        )
        .unwrap()
        .unwrap();
        assert_eq!(op, PatchOp::Replace { path: "/assignee/0".into(), value: json!("Joe") });

        let null = apply_lens_to_op(
            &wrap,
            PatchOp::Replace { path: "/assignee".into(), value: json!(null) },
        )
        .unwrap()
        .unwrap();
        assert_eq!(null, PatchOp::Remove { path: "/assignee/0".into() });

        let head = vec![LensOp::Head { name: "assignee".into() }];
        let shifted = apply_lens_to_op(&head, PatchOp::Remove { path: "/assignee/0".into() })
            .unwrap()
            .unwrap();
        assert_eq!(shifted, PatchOp::Replace { path: "/assignee".into(), value: json!(null) });

        let past_head =
            apply_lens_to_op(&head, PatchOp::Add { path: "/assignee/1".into(), value: json!("Jill") })
                .unwrap();
        assert_eq!(past_head, None);
    }

    #[test]
    fn defaults_fill_created_objects() {
        let lens = vec![
            LensOp::Add(Property::string("name")),
            LensOp::Add(Property::string("summary")),
        ];
        let (patch, _) = apply_lens_to_patch(
            &lens,
            &[PatchOp::Add { path: "".into(), value: json!({}) }],
            &empty_object_schema(),
        )
        .unwrap();
        assert_eq!(
            patch,
            vec![
                PatchOp::Add { path: "".into(), value: json!({}) },
                PatchOp::Add { path: "/name".into(), value: json!("") },
                PatchOp::Add { path: "/summary".into(), value: json!("") },
            ]
        );
    }

    #[test]
    fn defaults_from_early_edges_survive_later_edges() {
        let scalar = vec![LensOp::Add(
            Property::string("assignee").nullable().with_default(json!("Bob")),
        )];
        let wrapped = vec![
            LensOp::Wrap { name: "assignee".into() },
            LensOp::Rename { source: "assignee".into(), destination: "assignees".into() },
        ];
        let (patch, _) = apply_lens_stack(
            &[scalar, wrapped],
            vec![PatchOp::Add { path: "".into(), value: json!({}) }],
            &empty_object_schema(),
        )
        .unwrap();
        assert_eq!(
            patch,
            vec![
                PatchOp::Add { path: "".into(), value: json!({}) },
                PatchOp::Add { path: "/assignees".into(), value: json!([]) },
                PatchOp::Add { path: "/assignees/0".into(), value: json!("Bob") },
            ]
        );
    }

    #[test]
    fn plunge_moves_writes_under_the_host() {
        let lens = vec![LensOp::Plunge { host: "details".into(), name: "date".into() }];
        let op = apply_lens_to_op(&lens, PatchOp::Replace { path: "/date".into(), value: json!("x") })
            .unwrap()
            .unwrap();
        assert_eq!(op.path(), "/details/date");
    }

    #[test]
    fn escaped_keys_survive_lens_rewrites() {
        let lens = vec![LensOp::Plunge { host: "meta".into(), name: "a/b".into() }];
        let op = apply_lens_to_op(
            &lens,
            PatchOp::Replace { path: "/a~1b".into(), value: json!(1) },
        )
        .unwrap()
        .unwrap();
        assert_eq!(op.path(), "/meta/a~1b");
    }
}
