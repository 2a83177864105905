// Schema node model shared by the parser, the translator and the renderer.
//
// The serialized form mirrors the builder's own `_def` tagging: every node is
// an object with a `"kind"` tag plus per-kind attributes.

use indexmap::IndexMap;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    #[serde(flatten)]
    pub kind: Kind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Concrete default. Date nodes hold an ISO-8601 string or epoch millis.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Kind {
    String {
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        checks: Vec<StringCheck>,
    },
    Number {
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        checks: Vec<NumberCheck>,
    },
    Boolean,
    Date,
    Null,
    Array {
        item: Box<Node>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        checks: Vec<LengthCheck>,
    },
    Object {
        #[serde(default)]
        fields: IndexMap<String, Node>,  // declaration order
        #[serde(default, rename = "unknownKeys")]
        unknown_keys: UnknownKeys,
    },
    Optional { inner: Box<Node> },
    Nullable { inner: Box<Node> },
    Enum { values: Vec<String> },
    Literal { value: Value },
    Union { options: Vec<Node> },
    Intersection { left: Box<Node>, right: Box<Node> },
    Record {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<Box<Node>>,
    },
    Tuple { items: Vec<Node> },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum StringCheck {
    Min { value: u64 },
    Max { value: u64 },
    Length { value: u64 },
    Email,
    Url,
    Uuid,
    Datetime,
    Regex {
        pattern: String,
        #[serde(default, skip_serializing_if = "String::is_empty")]
        flags: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum NumberCheck {
    Min { value: OrderedFloat<f64>, inclusive: bool },
    Max { value: OrderedFloat<f64>, inclusive: bool },
    Int,
    MultipleOf { value: OrderedFloat<f64> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum LengthCheck {
    Min { value: u64 },
    Max { value: u64 },
    Length { value: u64 },
}

/// What an object does with keys it does not declare.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnknownKeys {
    Strict,
    Passthrough,
    #[default]
    Strip,
}

impl From<Kind> for Node {
    fn from(kind: Kind) -> Self {
        Self { kind, description: None, default: None }
    }
}

impl Node {
    pub fn string() -> Self { Kind::String { checks: Vec::new() }.into() }
    pub fn number() -> Self { Kind::Number { checks: Vec::new() }.into() }
    pub fn integer() -> Self { Kind::Number { checks: vec![NumberCheck::Int] }.into() }
    pub fn boolean() -> Self { Kind::Boolean.into() }
    pub fn null() -> Self { Kind::Null.into() }
    pub fn unknown() -> Self { Kind::Unknown.into() }

    pub fn array(item: Node) -> Self {
        Kind::Array { item: Box::new(item), checks: Vec::new() }.into()
    }

    pub fn object<I, K>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, Node)>,
        K: Into<String>,
    {
        Kind::Object {
            fields: fields.into_iter().map(|(k, v)| (k.into(), v)).collect(),
            unknown_keys: UnknownKeys::default(),
        }
        .into()
    }

    pub fn optional(self) -> Self {
        Kind::Optional { inner: Box::new(self) }.into()
    }

    pub fn nullable(self) -> Self {
        Kind::Nullable { inner: Box::new(self) }.into()
    }

    pub fn described(mut self, text: impl Into<String>) -> Self {
        self.description = Some(text.into());
        self
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn is_optional(&self) -> bool {
        matches!(self.kind, Kind::Optional { .. })
    }

    /// Innermost node beneath any optional/nullable wrappers.
    pub fn unwrapped(&self) -> &Node {
        match &self.kind {
            Kind::Optional { inner } | Kind::Nullable { inner } => inner.unwrapped(),
            _ => self,
        }
    }

    /// Levels in this node's tree; a leaf counts as 1.
    pub fn height(&self) -> usize {
        let children = match &self.kind {
            Kind::Array { item, .. } => item.height(),
            Kind::Optional { inner } | Kind::Nullable { inner } => inner.height(),
            Kind::Intersection { left, right } => left.height().max(right.height()),
            Kind::Record { value } => value.as_ref().map_or(0, |v| v.height()),
            Kind::Object { fields, .. } => fields.values().map(Node::height).max().unwrap_or(0),
            Kind::Union { options: nodes } | Kind::Tuple { items: nodes } => {
                nodes.iter().map(Node::height).max().unwrap_or(0)
            }
            _ => 0,
        };
        1 + children
    }

    /// Kind tag as it appears in the serialized form.
    pub fn kind_name(&self) -> &'static str {
        match &self.kind {
            Kind::String { .. } => "string",
            Kind::Number { .. } => "number",
            Kind::Boolean => "boolean",
            Kind::Date => "date",
            Kind::Null => "null",
            Kind::Array { .. } => "array",
            Kind::Object { .. } => "object",
            Kind::Optional { .. } => "optional",
            Kind::Nullable { .. } => "nullable",
            Kind::Enum { .. } => "enum",
            Kind::Literal { .. } => "literal",
            Kind::Union { .. } => "union",
            Kind::Intersection { .. } => "intersection",
            Kind::Record { .. } => "record",
            Kind::Tuple { .. } => "tuple",
            Kind::Unknown => "unknown",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn serialized_form_is_kind_tagged() {
        let node = Node::object([
            ("email", Kind::String { checks: vec![StringCheck::Email] }.into()),
            ("age", Node::integer().optional()),
        ])
        .described("a user");
        let v = serde_json::to_value(&node).unwrap();
        assert_eq!(v, json!({
            "kind": "object",
            "fields": {
                "email": { "kind": "string", "checks": [{ "kind": "email" }] },
                "age": { "kind": "optional", "inner": { "kind": "number", "checks": [{ "kind": "int" }] } }
            },
            "unknownKeys": "strip",
            "description": "a user"
        }));
        let back: Node = serde_json::from_value(v).unwrap();
        assert_eq!(back, node);
    }

    #[test]
    fn unrecognized_kind_tags_degrade_to_unknown() {
        let node: Node = serde_json::from_value(json!({ "kind": "bigint" })).unwrap();
        assert_eq!(node.kind, Kind::Unknown);
    }

    #[test]
    fn field_order_is_preserved() {
        let node: Node = serde_json::from_value(json!({
            "kind": "object",
            "fields": { "z": { "kind": "boolean" }, "a": { "kind": "null" } }
        }))
        .unwrap();
        let Kind::Object { fields, unknown_keys } = node.kind else { panic!("object") };
        assert_eq!(fields.keys().collect::<Vec<_>>(), ["z", "a"]);
        assert_eq!(unknown_keys, UnknownKeys::Strip);
    }

    #[test]
    fn height_counts_wrappers_and_children() {
        assert_eq!(Node::string().height(), 1);
        assert_eq!(Node::string().nullable().optional().height(), 3);
        let node = Node::object([
            ("a", Node::boolean()),
            ("b", Node::array(Node::null())),
        ]);
        assert_eq!(node.height(), 3);
        assert_eq!(Node::from(Kind::Record { value: None }).height(), 1);
    }
}
