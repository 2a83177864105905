//! Render schema nodes back into builder source.
//!
//! Objects with fields are laid out one field per line; everything else stays
//! on the line it starts on. Output always re-parses with
//! [`crate::parse::parse_builder`] into an equal node.
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::ir::{Kind, LengthCheck, Node, NumberCheck, StringCheck, UnknownKeys};
use crate::parse::number_from_f64;

static PLAIN_KEY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_$][A-Za-z0-9_$]*$").expect("valid identifier regex")
});

pub struct Codegen {
    out: String,
    indent: usize,
}

impl Codegen {
    /// `indent` is the number of spaces per nested object level.
    pub fn new(indent: usize) -> Self {
        Self { out: String::new(), indent }
    }

    pub fn emit(&mut self, node: &Node) {
        self.node(node, 0);
    }

    pub fn into_string(self) -> String {
        self.out
    }

    fn node(&mut self, node: &Node, level: usize) {
        match &node.kind {
            Kind::String { checks } => {
                self.out.push_str("z.string()");
                for check in checks {
                    self.string_check(check);
                }
            }
            Kind::Number { checks } => {
                self.out.push_str("z.number()");
                for check in checks {
                    self.number_check(check);
                }
            }
            Kind::Boolean => self.out.push_str("z.boolean()"),
            Kind::Date => self.out.push_str("z.date()"),
            Kind::Null => self.out.push_str("z.null()"),
            Kind::Unknown => self.out.push_str("z.any()"),
            Kind::Array { item, checks } => {
                self.out.push_str("z.array(");
                self.node(item, level);
                self.out.push(')');
                for check in checks {
                    let (name, value) = match check {
                        LengthCheck::Min { value } => ("min", value),
                        LengthCheck::Max { value } => ("max", value),
                        LengthCheck::Length { value } => ("length", value),
                    };
                    self.out.push_str(&format!(".{name}({value})"));
                }
            }
            Kind::Object { fields, unknown_keys } => {
                if fields.is_empty() {
                    self.out.push_str("z.object({})");
                } else {
                    self.out.push_str("z.object({\n");
                    let pad = " ".repeat(self.indent * (level + 1));
                    for (i, (key, field)) in fields.iter().enumerate() {
                        if i > 0 {
                            self.out.push_str(",\n");
                        }
                        self.out.push_str(&pad);
                        self.key(key);
                        self.out.push_str(": ");
                        self.node(field, level + 1);
                    }
                    self.out.push('\n');
                    self.out.push_str(&" ".repeat(self.indent * level));
                    self.out.push_str("})");
                }
                match unknown_keys {
                    UnknownKeys::Strict => self.out.push_str(".strict()"),
                    UnknownKeys::Passthrough => self.out.push_str(".passthrough()"),
                    UnknownKeys::Strip => {}
                }
            }
            Kind::Optional { inner } => {
                self.node(inner, level);
                self.out.push_str(".optional()");
            }
            Kind::Nullable { inner } => {
                self.node(inner, level);
                self.out.push_str(".nullable()");
            }
            Kind::Enum { values } => {
                let quoted: Vec<String> = values.iter().map(|v| json_text(&Value::from(v.as_str()))).collect();
                self.out.push_str(&format!("z.enum([{}])", quoted.join(", ")));
            }
            Kind::Literal { value } => {
                self.out.push_str(&format!("z.literal({})", json_text(value)));
            }
            Kind::Union { options } => {
                self.out.push_str("z.union([");
                self.list(options, level);
                self.out.push_str("])");
            }
            Kind::Intersection { left, right } => {
                self.out.push_str("z.intersection(");
                self.node(left, level);
                self.out.push_str(", ");
                self.node(right, level);
                self.out.push(')');
            }
            Kind::Record { value } => match value {
                Some(value) => {
                    self.out.push_str("z.record(z.string(), ");
                    self.node(value, level);
                    self.out.push(')');
                }
                None => self.out.push_str("z.record()"),
            },
            Kind::Tuple { items } => {
                self.out.push_str("z.tuple([");
                self.list(items, level);
                self.out.push_str("])");
            }
        }

        if let Some(text) = &node.description {
            self.out.push_str(&format!(".describe({})", json_text(&Value::from(text.as_str()))));
        }
        if let Some(value) = &node.default {
            let rendered = match (&node.unwrapped().kind, value) {
                (Kind::Date, Value::String(_) | Value::Number(_)) => match crate::date::normalize(value) {
                    Some(iso) => format!("new Date({})", json_text(&Value::from(iso))),
                    None => json_text(value),
                },
                _ => json_text(value),
            };
            self.out.push_str(&format!(".default({rendered})"));
        }
    }

    fn list(&mut self, nodes: &[Node], level: usize) {
        for (i, node) in nodes.iter().enumerate() {
            if i > 0 {
                self.out.push_str(", ");
            }
            self.node(node, level);
        }
    }

    fn key(&mut self, key: &str) {
        if PLAIN_KEY.is_match(key) {
            self.out.push_str(key);
        } else {
            self.out.push_str(&json_text(&Value::from(key)));
        }
    }

    fn string_check(&mut self, check: &StringCheck) {
        let call = match check {
            StringCheck::Min { value } => format!(".min({value})"),
            StringCheck::Max { value } => format!(".max({value})"),
            StringCheck::Length { value } => format!(".length({value})"),
            StringCheck::Email => ".email()".into(),
            StringCheck::Url => ".url()".into(),
            StringCheck::Uuid => ".uuid()".into(),
            StringCheck::Datetime => ".datetime()".into(),
            StringCheck::Regex { pattern, flags } => {
                format!(".regex(/{}/{flags})", regex_body(pattern))
            }
        };
        self.out.push_str(&call);
    }

    fn number_check(&mut self, check: &NumberCheck) {
        let call = match check {
            NumberCheck::Int => ".int()".into(),
            NumberCheck::Min { value, inclusive: true } => format!(".min({})", number_text(value.0)),
            NumberCheck::Min { value, inclusive: false } => format!(".gt({})", number_text(value.0)),
            NumberCheck::Max { value, inclusive: true } => format!(".max({})", number_text(value.0)),
            NumberCheck::Max { value, inclusive: false } => format!(".lt({})", number_text(value.0)),
            NumberCheck::MultipleOf { value } => format!(".multipleOf({})", number_text(value.0)),
        };
        self.out.push_str(&call);
    }
}

fn json_text(value: &Value) -> String {
    // serializing a Value cannot fail
    serde_json::to_string(value).unwrap_or_default()
}

fn number_text(f: f64) -> String {
    number_from_f64(f).map(|n| n.to_string()).unwrap_or_else(|| "0".into())
}

/// Regex literal body: bare slashes are escaped, an empty pattern matches everything.
fn regex_body(pattern: &str) -> String {
    if pattern.is_empty() {
        return "(?:)".into();
    }
    let mut out = String::with_capacity(pattern.len());
    let mut chars = pattern.chars();
    let mut in_class = false;
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                out.push(c);
                if let Some(next) = chars.next() {
                    out.push(next);
                }
                continue;
            }
            '[' => in_class = true,
            ']' => in_class = false,
            '/' if !in_class => out.push('\\'),
            '\n' => {
                out.push_str("\\n");
                continue;
            }
            _ => {}
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::Options;
    use crate::parse::parse_builder;

    fn render(node: &Node) -> String {
        let mut cg = Codegen::new(2);
        cg.emit(node);
        cg.into_string()
    }

    fn round_trip(src: &str) {
        let opts = Options::default();
        let node = parse_builder(src, &opts).unwrap();
        let rendered = render(&node);
        let back = parse_builder(&rendered, &opts).unwrap_or_else(|e| panic!("{rendered}: {e}"));
        assert_eq!(back, node, "{rendered}");
    }

    #[test]
    fn nested_objects_indent_per_level() {
        let node = Node::object([
            ("id", Node::integer()),
            ("meta", Node::object([("tags", Node::array(Node::string()))])),
            ("empty", Node::object(Vec::<(String, Node)>::new())),
        ]);
        assert_eq!(
            render(&node),
            "z.object({\n  id: z.number().int(),\n  meta: z.object({\n    tags: z.array(z.string())\n  }),\n  empty: z.object({})\n})"
        );
    }

    #[test]
    fn awkward_keys_are_quoted() {
        let node = Node::object([("first-name", Node::string()), ("$ok", Node::null()), ("1x", Node::boolean())]);
        assert_eq!(
            render(&node),
            "z.object({\n  \"first-name\": z.string(),\n  $ok: z.null(),\n  \"1x\": z.boolean()\n})"
        );
    }

    #[test]
    fn checks_and_meta_render_as_calls() {
        let node = Kind::Number {
            checks: vec![
                NumberCheck::Min { value: 0.0.into(), inclusive: false },
                NumberCheck::Max { value: 2.5.into(), inclusive: true },
            ],
        };
        let node = Node::from(node).optional().described("ratio \"r\"");
        assert_eq!(render(&node), r#"z.number().gt(0).max(2.5).optional().describe("ratio \"r\"")"#);
    }

    #[test]
    fn rendered_source_parses_back_to_the_same_node() {
        for src in [
            "z.string().min(1).max(5).length(3).email().url().uuid().datetime()",
            r"z.string().regex(/^[a-z/]+\/x$/gi)",
            "z.number().int().gte(-3).lt(10).multipleOf(0.25)",
            "z.array(z.boolean()).nonempty().max(4)",
            "z.object({ a: z.string(), 'b c': z.null().optional() }).strict()",
            "z.object({}).passthrough()",
            "z.enum(['a', 'b\"']).nullable()",
            "z.union([z.literal('x'), z.literal(3), z.literal(true), z.literal(null)])",
            "z.intersection(z.object({ a: z.string() }), z.object({ b: z.date() }))",
            "z.record(z.string(), z.number()).or(z.record())",
            "z.tuple([z.string(), z.any()]).describe('pair')",
            "z.date().default(new Date('2020-01-02'))",
            "z.object({ n: z.number().default(1.5), tags: z.array(z.string()).default(['x']) })",
        ] {
            round_trip(src);
        }
    }

    #[test]
    fn empty_regex_stays_a_regex() {
        let node = Node::from(Kind::String {
            checks: vec![StringCheck::Regex { pattern: String::new(), flags: String::new() }],
        });
        assert_eq!(render(&node), "z.string().regex(/(?:)/)");
    }
}
