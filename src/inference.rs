//! Sample-driven schema inference.
//!
//! One JSON sample in, one schema node out. The mapping is shape-only:
//! - `null`, strings, booleans map to their kinds, with no constraints;
//! - numbers without a fractional part become integers;
//! - arrays take their item schema from the first element (`[]` gives `any`);
//! - objects keep every key, in sample order, all required.
//!
//! [`synthesize`] renders the inferred node as builder source.
use serde_json::{Number, Value};

use crate::codegen::Codegen;
use crate::convert::Options;
use crate::error::{ConvertError, Result};
use crate::ir::Node;

/// Infer a schema node describing `sample`.
pub fn infer_node(sample: &Value, opts: &Options) -> Result<Node> {
    observe(sample, 1, opts)
}

/// Infer a schema for `sample` and render it as builder source.
pub fn synthesize(sample: &Value, opts: &Options) -> Result<String> {
    let node = infer_node(sample, opts)?;
    let mut cg = Codegen::new(opts.indent);
    cg.emit(&node);
    Ok(cg.into_string())
}

fn observe(v: &Value, depth: usize, opts: &Options) -> Result<Node> {
    if depth > opts.max_depth {
        return Err(ConvertError::DepthExceeded { limit: opts.max_depth });
    }
    let node = match v {
        Value::Null => Node::null(),
        Value::Bool(_) => Node::boolean(),
        Value::String(_) => Node::string(),
        Value::Number(n) if is_integral(n) => Node::integer(),
        Value::Number(_) => Node::number(),
        Value::Array(xs) => match xs.first() {
            Some(first) => Node::array(observe(first, depth + 1, opts)?),
            None => Node::array(Node::unknown()),
        },
        Value::Object(map) => {
            let fields = map
                .iter()
                .map(|(k, v)| Ok((k.clone(), observe(v, depth + 1, opts)?)))
                .collect::<Result<Vec<_>>>()?;
            Node::object(fields)
        }
    };
    Ok(node)
}

fn is_integral(n: &Number) -> bool {
    n.is_i64() || n.is_u64() || n.as_f64().is_some_and(|f| f.fract() == 0.0)
}
