use serde_json::{json, Map, Value};

use crate::convert::Options;
use crate::error::{ConvertError, Result};
use crate::ir::{Kind, LengthCheck, Node, NumberCheck, StringCheck, UnknownKeys};

pub const SCHEMA_DIALECT: &str = "https://json-schema.org/draft/2020-12/schema";

/// Lower a node tree into a complete JSON Schema document.
///
/// The document always carries `$schema` and a `type` (falling back to
/// `"object"` when the root fragment has none, e.g. for unions).
pub fn to_json_schema(root: &Node, opts: &Options) -> Result<Value> {
    let fragment = lower_node(root, 1, opts)?;
    Ok(wrap_root(fragment))
}

/// Lower a serialized node (`{"kind": ...}` object) into a JSON Schema document.
pub fn translate_value(value: &Value, opts: &Options) -> Result<Value> {
    let node = node_from_value(value)?;
    to_json_schema(&node, opts)
}

/// Read the kind-tagged serialized form back into a [`Node`].
pub fn node_from_value(value: &Value) -> Result<Node> {
    let Some(map) = value.as_object() else {
        return Err(ConvertError::InvalidSchemaInput(format!(
            "expected a schema node object, found {}",
            value_kind(value)
        )));
    };
    if !matches!(map.get("kind"), Some(Value::String(_))) {
        return Err(ConvertError::InvalidSchemaInput(
            "schema node has no string \"kind\" tag".into(),
        ));
    }
    crate::path_de::from_value_with_path::<Node>(value.clone())
        .map_err(ConvertError::InvalidSchemaInput)
}

fn wrap_root(fragment: Map<String, Value>) -> Value {
    let mut root = Map::new();
    root.insert("$schema".into(), Value::from(SCHEMA_DIALECT));
    let ty = fragment.get("type").cloned().unwrap_or_else(|| Value::from("object"));
    root.insert("type".into(), ty);
    root.extend(fragment);
    Value::Object(root)
}

fn lower_node(node: &Node, depth: usize, opts: &Options) -> Result<Map<String, Value>> {
    if depth > opts.max_depth {
        return Err(ConvertError::DepthExceeded { limit: opts.max_depth });
    }
    let next = depth + 1;

    let mut o = Map::new();
    if let Some(text) = &node.description {
        o.insert("description".into(), Value::from(text.clone()));
    }

    match &node.kind {
        Kind::String { checks } => {
            o.insert("type".into(), json!("string"));
            for check in checks {
                match check {
                    StringCheck::Min { value } => { o.insert("minLength".into(), json!(value)); }
                    StringCheck::Max { value } => { o.insert("maxLength".into(), json!(value)); }
                    StringCheck::Length { value } => {
                        o.insert("minLength".into(), json!(value));
                        o.insert("maxLength".into(), json!(value));
                    }
                    StringCheck::Email => { o.insert("format".into(), json!("email")); }
                    StringCheck::Url => { o.insert("format".into(), json!("uri")); }
                    StringCheck::Uuid => { o.insert("format".into(), json!("uuid")); }
                    StringCheck::Datetime => { o.insert("format".into(), json!("date-time")); }
                    // pattern source goes through verbatim; flags have no JSON Schema form
                    StringCheck::Regex { pattern, .. } => {
                        o.insert("pattern".into(), Value::from(pattern.clone()));
                    }
                }
            }
        }
        Kind::Number { checks } => {
            o.insert("type".into(), json!("number"));
            for check in checks {
                match check {
                    NumberCheck::Min { value, inclusive } => {
                        o.insert("minimum".into(), json_num_pref_i64(value.0));
                        if !inclusive {
                            o.insert("exclusiveMinimum".into(), json!(true));
                        }
                    }
                    NumberCheck::Max { value, inclusive } => {
                        o.insert("maximum".into(), json_num_pref_i64(value.0));
                        if !inclusive {
                            o.insert("exclusiveMaximum".into(), json!(true));
                        }
                    }
                    NumberCheck::Int => { o.insert("type".into(), json!("integer")); }
                    NumberCheck::MultipleOf { value } => {
                        o.insert("multipleOf".into(), json_num_pref_i64(value.0));
                    }
                }
            }
        }
        Kind::Boolean => { o.insert("type".into(), json!("boolean")); }
        Kind::Date => {
            o.insert("type".into(), json!("string"));
            o.insert("format".into(), json!("date-time"));
        }
        Kind::Null => { o.insert("type".into(), json!("null")); }
        Kind::Array { item, checks } => {
            o.insert("type".into(), json!("array"));
            o.insert("items".into(), Value::Object(lower_node(item, next, opts)?));
            for check in checks {
                match check {
                    LengthCheck::Min { value } => { o.insert("minItems".into(), json!(value)); }
                    LengthCheck::Max { value } => { o.insert("maxItems".into(), json!(value)); }
                    LengthCheck::Length { value } => {
                        o.insert("minItems".into(), json!(value));
                        o.insert("maxItems".into(), json!(value));
                    }
                }
            }
        }
        Kind::Object { fields, unknown_keys } => {
            o.insert("type".into(), json!("object"));
            let mut props = Map::new();
            let mut required: Vec<Value> = Vec::new();
            for (name, field) in fields {
                props.insert(name.clone(), Value::Object(lower_node(field, next, opts)?));
                // nullable alone is still required; only optional opts out
                if !field.is_optional() {
                    required.push(Value::from(name.clone()));
                }
            }
            o.insert("properties".into(), Value::Object(props));
            if !required.is_empty() {
                o.insert("required".into(), Value::Array(required));
            }
            match unknown_keys {
                UnknownKeys::Passthrough => { o.insert("additionalProperties".into(), json!(true)); }
                UnknownKeys::Strict => { o.insert("additionalProperties".into(), json!(false)); }
                UnknownKeys::Strip => {}
            }
        }
        Kind::Optional { inner } => {
            let child = lower_node(inner, next, opts)?;
            return apply_wrapper_meta(child, node);
        }
        Kind::Nullable { inner } => {
            let child = widen_to_null(lower_node(inner, next, opts)?);
            return apply_wrapper_meta(child, node);
        }
        Kind::Enum { values } => {
            o.insert("type".into(), json!("string"));
            o.insert("enum".into(), json!(values));
        }
        Kind::Literal { value } => { o.insert("const".into(), value.clone()); }
        Kind::Union { options } => {
            let arms = options
                .iter()
                .map(|opt| lower_node(opt, next, opts).map(Value::Object))
                .collect::<Result<Vec<_>>>()?;
            o.insert("anyOf".into(), Value::Array(arms));
        }
        Kind::Intersection { left, right } => {
            let l = lower_node(left, next, opts)?;
            let r = lower_node(right, next, opts)?;
            o.insert("allOf".into(), json!([l, r]));
        }
        Kind::Record { value } => {
            o.insert("type".into(), json!("object"));
            let additional = match value {
                Some(v) => Value::Object(lower_node(v, next, opts)?),
                None => json!(true),
            };
            o.insert("additionalProperties".into(), additional);
        }
        Kind::Tuple { items } => {
            let elems = items
                .iter()
                .map(|item| lower_node(item, next, opts).map(Value::Object))
                .collect::<Result<Vec<_>>>()?;
            let n = elems.len();
            o.insert("type".into(), json!("array"));
            o.insert("items".into(), Value::Array(elems));
            o.insert("minItems".into(), json!(n));
            o.insert("maxItems".into(), json!(n));
        }
        // not valid JSON Schema; marks "could not classify"
        Kind::Unknown => {
            let mut any = Map::new();
            any.insert("type".into(), json!("any"));
            return Ok(any);
        }
    }

    if let Some(default) = &node.default {
        o.insert("default".into(), lower_default(node, default)?);
    }
    Ok(o)
}

/// Widen a fragment so it also admits `null`.
///
/// A scalar `type` becomes `[type, "null"]`; composed fragments without a
/// `type` are wrapped as `anyOf: [fragment, {type: "null"}]`.
fn widen_to_null(mut schema: Map<String, Value>) -> Map<String, Value> {
    match schema.get_mut("type") {
        Some(Value::String(ty)) => {
            let ty = std::mem::take(ty);
            schema.insert("type".into(), json!([ty, "null"]));
        }
        Some(Value::Array(tys)) => {
            if !tys.iter().any(|t| t == "null") {
                tys.push(json!("null"));
            }
        }
        _ => {
            let mut wrapped = Map::new();
            wrapped.insert("anyOf".into(), json!([schema, { "type": "null" }]));
            return wrapped;
        }
    }
    if let Some(Value::Array(values)) = schema.get_mut("enum") {
        if !values.contains(&Value::Null) {
            values.push(Value::Null);
        }
    }
    schema
}

// Wrapper metadata lands on top of the wrapped fragment.
fn apply_wrapper_meta(mut schema: Map<String, Value>, node: &Node) -> Result<Map<String, Value>> {
    if let Some(text) = &node.description {
        schema.insert("description".into(), Value::from(text.clone()));
    }
    if let Some(default) = &node.default {
        schema.insert("default".into(), lower_default(node, default)?);
    }
    Ok(schema)
}

fn lower_default(node: &Node, default: &Value) -> Result<Value> {
    if !matches!(node.unwrapped().kind, Kind::Date) {
        return Ok(default.clone());
    }
    // a nullable date may still default to null
    if default.is_null() && !std::ptr::eq(node.unwrapped(), node) {
        return Ok(Value::Null);
    }
    crate::date::normalize(default).map(Value::from).ok_or_else(|| {
        ConvertError::InvalidSchemaInput(format!("date default {default} is not a valid date"))
    })
}

// Helper: prefer emitting integers when exact
fn json_num_pref_i64(n: f64) -> Value {
    if n.is_finite() && n.fract() == 0.0 && n >= i64::MIN as f64 && n <= i64::MAX as f64 {
        Value::from(n as i64)
    } else {
        Value::from(n)
    }
}

fn value_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

// ------------------------------- Tests ------------------------------------ //
