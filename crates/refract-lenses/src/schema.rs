//! JSON-Schema updater and default-value derivation.
//!
//! Schemas are plain `serde_json` values of the form
//! `{"type": "object", "properties": {...}}`. Property enumeration order is
//! the object's insertion order, which is deterministic because schemas are
//! only ever produced by folding lens ops in registration order.

use crate::lens::LensOp;
use crate::pointer::Segment;
use crate::LensError;
use serde_json::{json, Map, Value};

/// The schema of the empty initial document.
pub fn empty_object_schema() -> Value {
    json!({ "type": "object", "properties": {} })
}

fn properties_mut<'a>(schema: &'a mut Value, at: &str) -> Result<&'a mut Map<String, Value>, LensError> {
    schema
        .as_object_mut()
        .filter(|m| m.get("type").and_then(Value::as_str) == Some("object"))
        .ok_or_else(|| LensError::NotAnObject(at.to_string()))?
        .entry("properties")
        .or_insert_with(|| Value::Object(Map::new()))
        .as_object_mut()
        .ok_or_else(|| LensError::NotAnObject(at.to_string()))
}

fn apply_schema_op(schema: &mut Value, op: &LensOp) -> Result<(), LensError> {
    match op {
        LensOp::Add(p) => {
            let props = properties_mut(schema, &p.name)?;
            if props.contains_key(&p.name) {
                return Err(LensError::PropertyExists(p.name.clone()));
            }
            props.insert(p.name.clone(), p.to_schema());
        }
        LensOp::Remove(p) => {
            let props = properties_mut(schema, &p.name)?;
            props
                .remove(&p.name)
                .ok_or_else(|| LensError::PropertyMissing(p.name.clone()))?;
        }
        LensOp::Rename {
            source,
            destination,
        } => {
            let props = properties_mut(schema, source)?;
            if props.contains_key(destination) {
                return Err(LensError::PropertyExists(destination.clone()));
            }
            let fragment = props
                .remove(source)
                .ok_or_else(|| LensError::PropertyMissing(source.clone()))?;
            props.insert(destination.clone(), fragment);
        }
        LensOp::Hoist { host, name } => {
            let props = properties_mut(schema, host)?;
            if props.contains_key(name) {
                return Err(LensError::PropertyExists(name.clone()));
            }
            let host_schema = props
                .get_mut(host)
                .ok_or_else(|| LensError::PropertyMissing(host.clone()))?;
            let fragment = properties_mut(host_schema, host)?
                .remove(name)
                .ok_or_else(|| LensError::PropertyMissing(name.clone()))?;
            props.insert(name.clone(), fragment);
        }
        LensOp::Plunge { host, name } => {
            if host == name {
                return Err(LensError::PlungeIntoSelf(name.clone()));
            }
            let props = properties_mut(schema, name)?;
            let fragment = props
                .remove(name)
                .ok_or_else(|| LensError::PropertyMissing(name.clone()))?;
            let host_schema = props
                .get_mut(host)
                .ok_or_else(|| LensError::PropertyMissing(host.clone()))?;
            let host_props = properties_mut(host_schema, host)?;
            if host_props.contains_key(name) {
                return Err(LensError::PropertyExists(name.clone()));
            }
            host_props.insert(name.clone(), fragment);
        }
        LensOp::Wrap { name } => {
            let props = properties_mut(schema, name)?;
            let inner = props
                .remove(name)
                .ok_or_else(|| LensError::PropertyMissing(name.clone()))?;
            props.insert(name.clone(), json!({ "type": "array", "items": inner }));
        }
        LensOp::Head { name } => {
            let props = properties_mut(schema, name)?;
            let array = props
                .remove(name)
                .ok_or_else(|| LensError::PropertyMissing(name.clone()))?;
            let inner = array
                .as_object()
                .filter(|m| m.get("type").and_then(Value::as_str) == Some("array"))
                .and_then(|m| m.get("items"))
                .cloned()
                .ok_or_else(|| LensError::NotAnArray(name.clone()))?;
            props.insert(name.clone(), inner);
        }
        LensOp::In { name, lens } => {
            let props = properties_mut(schema, name)?;
            let inner = props
                .get_mut(name)
                .ok_or_else(|| LensError::PropertyMissing(name.clone()))?;
            for op in lens {
                apply_schema_op(inner, op)?;
            }
        }
        LensOp::Map { lens } => {
            let items = schema
                .as_object_mut()
                .filter(|m| m.get("type").and_then(Value::as_str) == Some("array"))
                .and_then(|m| m.get_mut("items"))
                .ok_or_else(|| LensError::NotAnArray("items".to_string()))?;
            for op in lens {
                apply_schema_op(items, op)?;
            }
        }
    }
    Ok(())
}

/// Run a lens against a schema, producing the destination schema.
pub fn update_schema(schema: &Value, lens: &[LensOp]) -> Result<Value, LensError> {
    let mut out = schema.clone();
    for op in lens {
        apply_schema_op(&mut out, op)?;
    }
    Ok(out)
}

/// Descend a schema along path segments. Index segments descend into
/// array `items`.
pub fn schema_at_path<'a>(schema: &'a Value, segments: &[Segment]) -> Option<&'a Value> {
    let mut node = schema;
    for segment in segments {
        let ty = node.get("type").and_then(Value::as_str);
        node = match ty {
            Some("object") => node.get("properties")?.get(&segment.key_text())?,
            Some("array") if segment.index().is_some() => node.get("items")?,
            _ => return None,
        };
    }
    Some(node)
}

/// The default value of a schema node: the `default` annotation when
/// present, `null` for nullable unions, otherwise the type's zero value.
pub fn default_value(schema: &Value) -> Value {
    if let Some(default) = schema.get("default") {
        return default.clone();
    }
    match schema.get("type") {
        Some(Value::String(ty)) => zero_value(ty, schema),
        Some(Value::Array(tys)) => {
            if tys.iter().any(|t| t.as_str() == Some("null")) {
                return Value::Null;
            }
            tys.first()
                .and_then(Value::as_str)
                .map(|ty| zero_value(ty, schema))
                .unwrap_or(Value::Null)
        }
        _ => Value::Null,
    }
}

fn zero_value(ty: &str, schema: &Value) -> Value {
    match ty {
        "string" => json!(""),
        "number" | "integer" => json!(0),
        "boolean" => json!(false),
        "array" => json!([]),
        "object" => {
            let mut out = Map::new();
            if let Some(props) = schema.get("properties").and_then(Value::as_object) {
                for (name, fragment) in props {
                    out.insert(name.clone(), default_value(fragment));
                }
            }
            Value::Object(out)
        }
        _ => Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lens::Property;

    fn base() -> Value {
        update_schema(
            &empty_object_schema(),
            &[
                LensOp::Add(Property::string("name")),
                LensOp::Add(Property::string("summary")),
            ],
        )
        .unwrap()
    }

    #[test]
    fn add_and_rename() {
        let schema = update_schema(
            &base(),
            &[LensOp::Rename {
                source: "name".into(),
                destination: "title".into(),
            }],
        )
        .unwrap();
        let props = schema["properties"].as_object().unwrap();
        assert!(props.contains_key("title"));
        assert!(!props.contains_key("name"));
    }

    #[test]
    fn duplicate_add_is_rejected() {
        let err = update_schema(&base(), &[LensOp::Add(Property::string("name"))]).unwrap_err();
        assert_eq!(err, LensError::PropertyExists("name".into()));
    }

    #[test]
    fn plunge_moves_into_host() {
        let schema = update_schema(
            &base(),
            &[
                LensOp::Add(Property::object("details")),
                LensOp::Plunge {
                    host: "details".into(),
                    name: "summary".into(),
                },
            ],
        )
        .unwrap();
        assert!(schema["properties"]["details"]["properties"]
            .as_object()
            .unwrap()
            .contains_key("summary"));
    }

    #[test]
    fn wrap_then_head_restores_scalar() {
        let wrapped = update_schema(&base(), &[LensOp::Wrap { name: "name".into() }]).unwrap();
        assert_eq!(wrapped["properties"]["name"]["type"], json!("array"));
        let back = update_schema(&wrapped, &[LensOp::Head { name: "name".into() }]).unwrap();
        assert_eq!(back, base());
    }

    #[test]
    fn defaults_prefer_annotations_then_null() {
        let schema = update_schema(
            &empty_object_schema(),
            &[
                LensOp::Add(Property::string("a").with_default(json!("Bob"))),
                LensOp::Add(Property::string("b").nullable()),
                LensOp::Add(Property::array_of("c", json!({ "type": "string" }))),
            ],
        )
        .unwrap();
        assert_eq!(
            default_value(&schema),
            json!({ "a": "Bob", "b": null, "c": [] })
        );
    }

    #[test]
    fn schema_at_path_descends_arrays() {
        let schema = update_schema(
            &empty_object_schema(),
            &[LensOp::Add(Property::array_of(
                "tags",
                json!({ "type": "string" }),
            ))],
        )
        .unwrap();
        let node = schema_at_path(&schema, &[Segment::key("tags"), Segment::Index(0)]).unwrap();
        assert_eq!(node["type"], json!("string"));
    }
}
