//! Builder source → schema node.
//!
//! Builder expressions (`z.object({ id: z.string().uuid() }).strict()`) are
//! matched against a pest grammar (`builder.pest`) and the resulting pairs are
//! walked into [`Node`]s. Only the builder vocabulary exists, so source text
//! can construct schema nodes and nothing else.
//!
//! Method calls are applied to the receiver as soon as they are read, so
//! errors point at the call that caused them. Every constructed node's height
//! is checked against `max_depth`, including the levels added by wrapping
//! methods such as `.optional()` or `.array()`.
mod grammar;

use indexmap::IndexMap;
use ordered_float::OrderedFloat;
use pest::error::LineColLocation;
use pest::iterators::Pair;
use pest::Parser;
use serde_json::{Map, Number, Value};

use crate::convert::Options;
use crate::error::{ConvertError, Result};
use crate::ir::{Kind, LengthCheck, Node, NumberCheck, StringCheck, UnknownKeys};
use grammar::{BuilderGrammar, Rule};

/// Parse builder source into a schema node.
pub fn parse_builder(src: &str, opts: &Options) -> Result<Node> {
    // every node level opens at most two brackets (`z.object({`)
    let bracket_limit = opts.max_depth.saturating_mul(2).saturating_add(2);
    if bracket_depth(src) > bracket_limit {
        return Err(ConvertError::DepthExceeded { limit: opts.max_depth });
    }

    let program = BuilderGrammar::parse(Rule::program, src)
        .map_err(syntax_error)?
        .next()
        .ok_or_else(|| ConvertError::evaluation_at(src, 0, "empty program"))?;
    let term = program
        .into_inner()
        .find(|p| p.as_rule() == Rule::term)
        .ok_or_else(|| ConvertError::evaluation_at(src, 0, "expected a schema expression"))?;

    let builder = Builder { src, max_depth: opts.max_depth };
    match builder.term(term)?.term {
        Term::Schema(node) => Ok(node),
        other => Err(ConvertError::InvalidSchemaInput(format!(
            "expected a schema builder expression, found {}",
            other.describe()
        ))),
    }
}

/// Deepest bracket nesting, counting brackets inside literals too.
fn bracket_depth(src: &str) -> usize {
    let (mut depth, mut deepest) = (0usize, 0usize);
    for c in src.chars() {
        match c {
            '(' | '[' | '{' => {
                depth += 1;
                deepest = deepest.max(depth);
            }
            ')' | ']' | '}' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    deepest
}

fn syntax_error(err: pest::error::Error<Rule>) -> ConvertError {
    let (line, column) = match err.line_col {
        LineColLocation::Pos(at) | LineColLocation::Span(at, _) => at,
    };
    let err = err.renamed_rules(|rule| rule_name(*rule).to_string());
    ConvertError::Evaluation { message: err.variant.message().into_owned(), line, column }
}

fn rule_name(rule: Rule) -> &'static str {
    match rule {
        Rule::EOI => "end of input",
        Rule::term | Rule::program => "an expression",
        Rule::method => "a method call",
        Rule::call_args => "an argument list",
        Rule::entry => "a property",
        Rule::ident | Rule::ctor_name => "a name",
        Rule::string => "a string",
        Rule::number | Rule::digits => "a number",
        Rule::regex => "a regular expression",
        Rule::array_lit => "an array literal",
        Rule::object_lit => "an object literal",
        _ => "a token",
    }
}

// ------------------------------- Terms ----------------------------------- //

/// A parsed sub-expression: either a schema or a plain value used as an argument.
#[derive(Debug, Clone)]
enum Term {
    Schema(Node),
    Scalar(Value),
    Array(Vec<Arg>),
    Object(IndexMap<String, Arg>),
    /// `new Date(...)`, already normalized to an ISO string
    Date(String),
    Regex { pattern: String, flags: String },
}

#[derive(Debug, Clone)]
struct Arg {
    term: Term,
    offset: usize,
    /// Height of the deepest schema inside this term, 0 for plain values.
    height: usize,
}

impl Arg {
    fn value(term: Term, offset: usize) -> Self {
        Self { term, offset, height: 0 }
    }
}

impl Term {
    fn describe(&self) -> String {
        match self {
            Term::Schema(node) => format!("a {} schema", node.kind_name()),
            Term::Scalar(Value::String(_)) => "a string".into(),
            Term::Scalar(Value::Number(_)) => "a number".into(),
            Term::Scalar(Value::Bool(_)) => "a boolean".into(),
            Term::Scalar(_) => "null".into(),
            Term::Array(_) => "an array literal".into(),
            Term::Object(_) => "an object literal".into(),
            Term::Date(_) => "a date".into(),
            Term::Regex { .. } => "a regular expression".into(),
        }
    }
}

// Constructors of kinds without a JSON Schema rendering.
const OPAQUE_CONSTRUCTORS: &[&str] = &[
    "bigint", "symbol", "undefined", "void", "never", "nan", "set", "map",
    "function", "promise", "lazy", "instanceof", "custom",
];

// Object methods whose result height is not a simple offset of the receiver's.
const RESHAPING_METHODS: &[&str] = &["extend", "merge", "partial", "required", "pick", "omit", "keyof"];

// ------------------------------- Builder --------------------------------- //

struct Builder<'a> {
    src: &'a str,
    max_depth: usize,
}

impl<'a> Builder<'a> {
    fn error_at(&self, offset: usize, message: impl Into<String>) -> ConvertError {
        ConvertError::evaluation_at(self.src, offset, message)
    }

    fn check_height(&self, height: usize) -> Result<()> {
        if height > self.max_depth {
            return Err(ConvertError::DepthExceeded { limit: self.max_depth });
        }
        Ok(())
    }

    /// term := primary method*
    fn term(&self, pair: Pair<'a, Rule>) -> Result<Arg> {
        let offset = pair.as_span().start();
        let mut inner = pair.into_inner();
        let primary = inner
            .next()
            .ok_or_else(|| self.error_at(offset, "expected an expression"))?;
        let mut arg = self.primary(primary)?;

        for method in inner {
            let mut parts = method.into_inner();
            let (Some(name), Some(call)) = (parts.next(), parts.next()) else {
                return Err(self.error_at(offset, "malformed method call"));
            };
            let at = name.as_span().start();
            let args = self.args(call)?;
            arg = match arg.term {
                Term::Schema(node) => {
                    let (node, height) = self.call_method(node, arg.height, name.as_str(), args, at)?;
                    Arg { term: Term::Schema(node), offset, height }
                }
                other => {
                    return Err(self.error_at(at, format!(
                        "`.{}()` cannot be called on {}", name.as_str(), other.describe()
                    )));
                }
            };
        }
        Ok(Arg { offset, ..arg })
    }

    fn primary(&self, pair: Pair<'a, Rule>) -> Result<Arg> {
        let offset = pair.as_span().start();
        match pair.as_rule() {
            Rule::ctor_call => {
                let mut parts = pair.into_inner();
                let (Some(ctor), Some(call)) = (parts.next(), parts.next()) else {
                    return Err(self.error_at(offset, "malformed constructor call"));
                };
                let name = ctor
                    .into_inner()
                    .find(|p| p.as_rule() == Rule::ident)
                    .ok_or_else(|| self.error_at(offset, "expected a schema constructor"))?;
                let at = name.as_span().start();
                let args = self.args(call)?;
                let node = self.construct(name.as_str(), args, at)?;
                let height = node.height();
                self.check_height(height)?;
                Ok(Arg { term: Term::Schema(node), offset, height })
            }
            Rule::new_date => self.new_date(pair),
            Rule::number => {
                let n = parse_number(pair.as_str())
                    .ok_or_else(|| self.error_at(offset, format!("number {} is out of range", pair.as_str())))?;
                Ok(Arg::value(Term::Scalar(Value::Number(n)), offset))
            }
            Rule::string => Ok(Arg::value(Term::Scalar(Value::String(self.string(pair)?)), offset)),
            Rule::regex => {
                let mut parts = pair.into_inner();
                let pattern = parts.next().map(|p| p.as_str().to_string()).unwrap_or_default();
                let flags = parts.next().map(|p| p.as_str().to_string()).unwrap_or_default();
                Ok(Arg::value(Term::Regex { pattern, flags }, offset))
            }
            Rule::boolean => Ok(Arg::value(Term::Scalar(Value::Bool(pair.as_str() == "true")), offset)),
            Rule::null => Ok(Arg::value(Term::Scalar(Value::Null), offset)),
            Rule::array_lit => {
                let items = self.args(pair)?;
                let height = items.iter().map(|a| a.height).max().unwrap_or(0);
                Ok(Arg { term: Term::Array(items), offset, height })
            }
            Rule::object_lit => {
                let mut entries = IndexMap::new();
                let mut height = 0;
                for entry in pair.into_inner() {
                    let mut parts = entry.into_inner();
                    let (Some(key), Some(value)) = (parts.next(), parts.next()) else {
                        return Err(self.error_at(offset, "malformed property"));
                    };
                    let key = match key.as_rule() {
                        Rule::string => self.string(key)?,
                        Rule::number => parse_number(key.as_str())
                            .map(|n| n.to_string())
                            .ok_or_else(|| self.error_at(key.as_span().start(), "number is out of range"))?,
                        _ => key.as_str().to_string(),
                    };
                    let value = self.term(value)?;
                    height = height.max(value.height);
                    entries.insert(key, value);
                }
                Ok(Arg { term: Term::Object(entries), offset, height })
            }
            other => Err(self.error_at(offset, format!("unexpected {}", rule_name(other)))),
        }
    }

    /// Terms of a call argument list or array literal.
    fn args(&self, pair: Pair<'a, Rule>) -> Result<Vec<Arg>> {
        pair.into_inner().map(|term| self.term(term)).collect()
    }

    fn string(&self, pair: Pair<'a, Rule>) -> Result<String> {
        let offset = pair.as_span().start();
        let raw = pair.into_inner().next().map(|p| p.as_str()).unwrap_or("");
        unescape(raw).map_err(|message| self.error_at(offset, message))
    }

    fn new_date(&self, pair: Pair<'a, Rule>) -> Result<Arg> {
        let offset = pair.as_span().start();
        let mut parts = pair.into_inner().filter(|p| p.as_rule() != Rule::kw_new);
        let (Some(class), Some(call)) = (parts.next(), parts.next()) else {
            return Err(self.error_at(offset, "malformed `new` expression"));
        };
        let at = class.as_span().start();
        if class.as_str() != "Date" {
            return Err(self.error_at(at, format!("`new {}` is not supported", class.as_str())));
        }
        let args = self.args(call)?;
        match args.as_slice() {
            [] => Err(self.error_at(at, "`new Date()` needs an explicit date")),
            [arg] => {
                let value = self.value_arg(arg)?;
                crate::date::normalize(&value)
                    .map(|iso| Arg::value(Term::Date(iso), offset))
                    .ok_or_else(|| self.error_at(arg.offset, format!("invalid date {value}")))
            }
            _ => Err(self.error_at(at, "only single-argument `new Date(...)` is supported")),
        }
    }

    // ---------------------------- Constructors --------------------------- //

    fn construct(&self, name: &str, args: Vec<Arg>, at: usize) -> Result<Node> {
        let node = match name {
            "string" => self.primitive(Node::string(), name, args, at)?,
            "number" => self.primitive(Node::number(), name, args, at)?,
            "boolean" => self.primitive(Node::boolean(), name, args, at)?,
            "date" => self.primitive(Kind::Date.into(), name, args, at)?,
            "null" => self.primitive(Node::null(), name, args, at)?,
            "any" | "unknown" => self.primitive(Node::unknown(), name, args, at)?,
            _ if OPAQUE_CONSTRUCTORS.contains(&name) => Node::unknown(),
            "array" => {
                let args = self.arity(name, args, 1, 2, at)?;
                Node::array(self.schema_arg(&args[0])?)
            }
            "object" | "strictObject" | "looseObject" => {
                let args = self.arity(name, args, 1, 2, at)?;
                let fields = self.shape_arg(&args[0])?;
                let unknown_keys = match name {
                    "strictObject" => UnknownKeys::Strict,
                    "looseObject" => UnknownKeys::Passthrough,
                    _ => UnknownKeys::Strip,
                };
                Kind::Object { fields, unknown_keys }.into()
            }
            "enum" => {
                let args = self.arity(name, args, 1, 2, at)?;
                let values = self.string_list_arg(&args[0])?;
                if values.is_empty() {
                    return Err(self.error_at(args[0].offset, "`enum()` needs at least one value"));
                }
                Kind::Enum { values }.into()
            }
            "literal" => {
                let args = self.arity(name, args, 1, 2, at)?;
                match &args[0].term {
                    Term::Scalar(value) => Kind::Literal { value: value.clone() }.into(),
                    other => {
                        return Err(self.error_at(args[0].offset, format!(
                            "`literal()` takes a string, number, boolean or null, found {}",
                            other.describe()
                        )));
                    }
                }
            }
            "union" => {
                let args = self.arity(name, args, 1, 2, at)?;
                let options = self.schema_list_arg(&args[0])?;
                if options.is_empty() {
                    return Err(self.error_at(args[0].offset, "`union()` needs at least one option"));
                }
                Kind::Union { options }.into()
            }
            "intersection" => {
                let args = self.arity(name, args, 2, 2, at)?;
                Kind::Intersection {
                    left: Box::new(self.schema_arg(&args[0])?),
                    right: Box::new(self.schema_arg(&args[1])?),
                }
                .into()
            }
            "record" => {
                let args = self.arity(name, args, 0, 2, at)?;
                let value = match args.as_slice() {
                    [] => None,
                    [value] => Some(self.schema_arg(value)?),
                    // key schemas carry no constraint here; they still have to be schemas
                    [key, value] => {
                        self.schema_arg(key)?;
                        Some(self.schema_arg(value)?)
                    }
                    _ => unreachable!("arity checked"),
                };
                Kind::Record { value: value.map(Box::new) }.into()
            }
            "tuple" => {
                let args = self.arity(name, args, 1, 1, at)?;
                Kind::Tuple { items: self.schema_list_arg(&args[0])? }.into()
            }
            "optional" | "nullable" | "nullish" => {
                let args = self.arity(name, args, 1, 2, at)?;
                let inner = self.schema_arg(&args[0])?;
                match name {
                    "optional" => inner.optional(),
                    "nullable" => inner.nullable(),
                    _ => inner.nullable().optional(),
                }
            }
            _ => return Err(self.error_at(at, format!("`{name}` is not a schema constructor"))),
        };
        Ok(node)
    }

    /// Primitive constructors take an optional params object; `description` is honored.
    fn primitive(&self, mut node: Node, name: &str, args: Vec<Arg>, at: usize) -> Result<Node> {
        let args = self.arity(name, args, 0, 1, at)?;
        if let Some(params) = args.first() {
            let Term::Object(entries) = &params.term else {
                return Err(self.error_at(params.offset, format!(
                    "`{name}()` takes an optional params object, found {}",
                    params.term.describe()
                )));
            };
            if let Some(text) = entries.get("description") {
                node.description = Some(self.string_arg(text)?);
            }
        }
        Ok(node)
    }

    // ------------------------------ Methods ------------------------------ //

    /// Apply one method and work out the height of the result without walking it.
    fn call_method(&self, node: Node, height: usize, name: &str, args: Vec<Arg>, at: usize) -> Result<(Node, usize)> {
        let arg_height = args.iter().map(|a| a.height).max().unwrap_or(0);
        let node = self.apply_method(node, name, args, at)?;
        let height = match name {
            "optional" | "nullable" | "array" => height + 1,
            "nullish" => height + 2,
            "or" | "and" => 1 + height.max(arg_height),
            _ if RESHAPING_METHODS.contains(&name) => node.height(),
            _ => height,
        };
        self.check_height(height)?;
        Ok((node, height))
    }

    fn apply_method(&self, node: Node, name: &str, args: Vec<Arg>, at: usize) -> Result<Node> {
        match name {
            "optional" => {
                self.arity(name, args, 0, 0, at)?;
                return Ok(node.optional());
            }
            "nullable" => {
                self.arity(name, args, 0, 0, at)?;
                return Ok(node.nullable());
            }
            "nullish" => {
                self.arity(name, args, 0, 0, at)?;
                return Ok(node.nullable().optional());
            }
            "describe" => {
                let args = self.arity(name, args, 1, 1, at)?;
                let text = self.string_arg(&args[0])?;
                return Ok(node.described(text));
            }
            "default" => {
                let args = self.arity(name, args, 1, 1, at)?;
                let value = self.default_arg(&node, &args[0])?;
                return Ok(node.with_default(value));
            }
            "or" => {
                let args = self.arity(name, args, 1, 1, at)?;
                let other = self.schema_arg(&args[0])?;
                return Ok(Kind::Union { options: vec![node, other] }.into());
            }
            "and" => {
                let args = self.arity(name, args, 1, 1, at)?;
                let other = self.schema_arg(&args[0])?;
                return Ok(Kind::Intersection { left: Box::new(node), right: Box::new(other) }.into());
            }
            "array" => {
                self.arity(name, args, 0, 0, at)?;
                return Ok(Node::array(node));
            }
            // no effect on the accepted shape
            "readonly" | "brand" => {
                self.arity(name, args, 0, 1, at)?;
                return Ok(node);
            }
            _ => {}
        }

        if matches!(node.kind, Kind::Object { .. }) {
            return self.object_method(node, name, args, at);
        }
        let kind_name = node.kind_name();
        let mut node = node;
        let handled = match &mut node.kind {
            Kind::String { checks } => self.string_method(checks, name, &args, at)?,
            Kind::Number { checks } => self.number_method(checks, name, &args, at)?,
            Kind::Array { checks, .. } => self.array_method(checks, name, &args, at)?,
            _ => false,
        };
        if !handled {
            return Err(self.error_at(at, format!("`.{name}()` is not available on {kind_name} schemas")));
        }
        Ok(node)
    }

    fn string_method(&self, checks: &mut Vec<StringCheck>, name: &str, args: &[Arg], at: usize) -> Result<bool> {
        let check = match name {
            "min" | "max" | "length" => {
                let args = self.arity(name, args.to_vec(), 1, 2, at)?;
                let value = self.count_arg(&args[0])?;
                match name {
                    "min" => StringCheck::Min { value },
                    "max" => StringCheck::Max { value },
                    _ => StringCheck::Length { value },
                }
            }
            "nonempty" => {
                self.arity(name, args.to_vec(), 0, 1, at)?;
                StringCheck::Min { value: 1 }
            }
            "email" | "url" | "uuid" | "datetime" => {
                self.arity(name, args.to_vec(), 0, 1, at)?;
                match name {
                    "email" => StringCheck::Email,
                    "url" => StringCheck::Url,
                    "uuid" => StringCheck::Uuid,
                    _ => StringCheck::Datetime,
                }
            }
            "regex" => {
                let args = self.arity(name, args.to_vec(), 1, 2, at)?;
                let Term::Regex { pattern, flags } = &args[0].term else {
                    return Err(self.error_at(args[0].offset, format!(
                        "`.regex()` takes a regular expression literal, found {}",
                        args[0].term.describe()
                    )));
                };
                StringCheck::Regex { pattern: pattern.clone(), flags: flags.clone() }
            }
            // transforms leave the accepted shape alone
            "trim" | "toLowerCase" | "toUpperCase" => {
                self.arity(name, args.to_vec(), 0, 0, at)?;
                return Ok(true);
            }
            _ => return Ok(false),
        };
        checks.push(check);
        Ok(true)
    }

    fn number_method(&self, checks: &mut Vec<NumberCheck>, name: &str, args: &[Arg], at: usize) -> Result<bool> {
        let zero = OrderedFloat(0.0);
        let check = match name {
            "min" | "gte" | "gt" | "max" | "lte" | "lt" | "multipleOf" | "step" => {
                let args = self.arity(name, args.to_vec(), 1, 2, at)?;
                let value = OrderedFloat(self.number_arg(&args[0])?);
                match name {
                    "min" | "gte" => NumberCheck::Min { value, inclusive: true },
                    "gt" => NumberCheck::Min { value, inclusive: false },
                    "max" | "lte" => NumberCheck::Max { value, inclusive: true },
                    "lt" => NumberCheck::Max { value, inclusive: false },
                    _ => NumberCheck::MultipleOf { value },
                }
            }
            "int" | "positive" | "nonnegative" | "negative" | "nonpositive" | "finite" => {
                self.arity(name, args.to_vec(), 0, 1, at)?;
                match name {
                    "int" => NumberCheck::Int,
                    "positive" => NumberCheck::Min { value: zero, inclusive: false },
                    "nonnegative" => NumberCheck::Min { value: zero, inclusive: true },
                    "negative" => NumberCheck::Max { value: zero, inclusive: false },
                    "nonpositive" => NumberCheck::Max { value: zero, inclusive: true },
                    // JSON numbers are always finite
                    _ => return Ok(true),
                }
            }
            _ => return Ok(false),
        };
        checks.push(check);
        Ok(true)
    }

    fn array_method(&self, checks: &mut Vec<LengthCheck>, name: &str, args: &[Arg], at: usize) -> Result<bool> {
        let check = match name {
            "min" | "max" | "length" => {
                let args = self.arity(name, args.to_vec(), 1, 2, at)?;
                let value = self.count_arg(&args[0])?;
                match name {
                    "min" => LengthCheck::Min { value },
                    "max" => LengthCheck::Max { value },
                    _ => LengthCheck::Length { value },
                }
            }
            "nonempty" => {
                self.arity(name, args.to_vec(), 0, 1, at)?;
                LengthCheck::Min { value: 1 }
            }
            _ => return Ok(false),
        };
        checks.push(check);
        Ok(true)
    }

    fn object_method(&self, mut node: Node, name: &str, args: Vec<Arg>, at: usize) -> Result<Node> {
        let Kind::Object { fields, unknown_keys } = &mut node.kind else {
            unreachable!("object_method is only called for object nodes");
        };
        match name {
            "strict" | "passthrough" | "strip" => {
                self.arity(name, args, 0, 1, at)?;
                *unknown_keys = match name {
                    "strict" => UnknownKeys::Strict,
                    "passthrough" => UnknownKeys::Passthrough,
                    _ => UnknownKeys::Strip,
                };
            }
            "extend" => {
                let args = self.arity(name, args, 1, 1, at)?;
                fields.extend(self.shape_arg(&args[0])?);
            }
            "merge" => {
                let args = self.arity(name, args, 1, 1, at)?;
                let other = self.schema_arg(&args[0])?;
                let Kind::Object { fields: more, unknown_keys: policy } = other.kind else {
                    return Err(self.error_at(args[0].offset, format!(
                        "`.merge()` takes an object schema, found a {} schema",
                        other.kind_name()
                    )));
                };
                fields.extend(more);
                *unknown_keys = policy;
            }
            "partial" | "required" => {
                let args = self.arity(name, args, 0, 1, at)?;
                let mask = match args.first() {
                    Some(arg) => Some(self.mask_arg(arg)?),
                    None => None,
                };
                for (key, field) in fields.iter_mut() {
                    if mask.as_ref().is_some_and(|m| !m.contains(key)) {
                        continue;
                    }
                    let taken = std::mem::replace(field, Node::unknown());
                    *field = if name == "partial" { make_optional(taken) } else { strip_optional(taken) };
                }
            }
            "pick" | "omit" => {
                let args = self.arity(name, args, 1, 1, at)?;
                let mask = self.mask_arg(&args[0])?;
                let keep_listed = name == "pick";
                fields.retain(|key, _| mask.contains(key) == keep_listed);
            }
            "keyof" => {
                self.arity(name, args, 0, 0, at)?;
                let values: Vec<String> = fields.keys().cloned().collect();
                return Ok(Kind::Enum { values }.into());
            }
            _ => {
                return Err(self.error_at(at, format!("`.{name}()` is not available on object schemas")));
            }
        }
        Ok(node)
    }

    // ------------------------------ Arguments ---------------------------- //

    fn arity(&self, name: &str, args: Vec<Arg>, min: usize, max: usize, at: usize) -> Result<Vec<Arg>> {
        let n = args.len();
        if (min..=max).contains(&n) {
            return Ok(args);
        }
        let expected = match (min, max) {
            (0, 0) => "no arguments".to_string(),
            (a, b) if a == b => format!("{a} argument{}", if a == 1 { "" } else { "s" }),
            (a, b) => format!("{a} to {b} arguments"),
        };
        Err(self.error_at(at, format!("`{name}()` expects {expected}, got {n}")))
    }

    fn schema_arg(&self, arg: &Arg) -> Result<Node> {
        match &arg.term {
            Term::Schema(node) => Ok(node.clone()),
            other => Err(self.error_at(arg.offset, format!("expected a schema, found {}", other.describe()))),
        }
    }

    fn schema_list_arg(&self, arg: &Arg) -> Result<Vec<Node>> {
        match &arg.term {
            Term::Array(items) => items.iter().map(|item| self.schema_arg(item)).collect(),
            other => Err(self.error_at(arg.offset, format!(
                "expected an array of schemas, found {}", other.describe()
            ))),
        }
    }

    fn shape_arg(&self, arg: &Arg) -> Result<IndexMap<String, Node>> {
        match &arg.term {
            Term::Object(entries) => entries
                .iter()
                .map(|(key, value)| Ok((key.clone(), self.schema_arg(value)?)))
                .collect(),
            other => Err(self.error_at(arg.offset, format!(
                "expected an object literal of schemas, found {}", other.describe()
            ))),
        }
    }

    fn mask_arg(&self, arg: &Arg) -> Result<Vec<String>> {
        match &arg.term {
            Term::Object(entries) => Ok(entries.keys().cloned().collect()),
            other => Err(self.error_at(arg.offset, format!(
                "expected a key mask like {{ name: true }}, found {}", other.describe()
            ))),
        }
    }

    fn string_arg(&self, arg: &Arg) -> Result<String> {
        match &arg.term {
            Term::Scalar(Value::String(s)) => Ok(s.clone()),
            other => Err(self.error_at(arg.offset, format!("expected a string, found {}", other.describe()))),
        }
    }

    fn string_list_arg(&self, arg: &Arg) -> Result<Vec<String>> {
        match &arg.term {
            Term::Array(items) => items.iter().map(|item| self.string_arg(item)).collect(),
            other => Err(self.error_at(arg.offset, format!(
                "expected an array of strings, found {}", other.describe()
            ))),
        }
    }

    fn number_arg(&self, arg: &Arg) -> Result<f64> {
        match &arg.term {
            Term::Scalar(Value::Number(n)) => n
                .as_f64()
                .ok_or_else(|| self.error_at(arg.offset, "number is out of range")),
            other => Err(self.error_at(arg.offset, format!("expected a number, found {}", other.describe()))),
        }
    }

    fn count_arg(&self, arg: &Arg) -> Result<u64> {
        let invalid = || self.error_at(arg.offset, "expected a non-negative integer");
        match &arg.term {
            Term::Scalar(Value::Number(n)) => n.as_u64().ok_or_else(invalid),
            _ => Err(invalid()),
        }
    }

    /// Plain JSON value of a literal argument.
    fn value_arg(&self, arg: &Arg) -> Result<Value> {
        match &arg.term {
            Term::Scalar(value) => Ok(value.clone()),
            Term::Date(iso) => Ok(Value::String(iso.clone())),
            Term::Array(items) => items
                .iter()
                .map(|item| self.value_arg(item))
                .collect::<Result<Vec<_>>>()
                .map(Value::Array),
            Term::Object(entries) => entries
                .iter()
                .map(|(key, value)| Ok((key.clone(), self.value_arg(value)?)))
                .collect::<Result<Map<String, Value>>>()
                .map(Value::Object),
            other => Err(self.error_at(arg.offset, format!("expected a value, found {}", other.describe()))),
        }
    }

    fn default_arg(&self, node: &Node, arg: &Arg) -> Result<Value> {
        let value = self.value_arg(arg)?;
        let is_date = matches!(node.unwrapped().kind, Kind::Date);
        if !is_date || (value.is_null() && !std::ptr::eq(node.unwrapped(), node)) {
            return Ok(value);
        }
        crate::date::normalize(&value).map(Value::from).ok_or_else(|| {
            self.error_at(arg.offset, format!("`.default()` of a date schema needs a date, found {value}"))
        })
    }
}

fn make_optional(node: Node) -> Node {
    if node.is_optional() { node } else { node.optional() }
}

fn strip_optional(node: Node) -> Node {
    match node.kind {
        Kind::Optional { inner } => strip_optional(*inner),
        _ => node,
    }
}


/// Decode the escapes of a string literal body.
fn unescape(raw: &str) -> std::result::Result<String, String> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let Some(c) = chars.next() else {
            return Err("unterminated escape sequence".into());
        };
        match c {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            'b' => out.push('\u{8}'),
            'f' => out.push('\u{c}'),
            'v' => out.push('\u{b}'),
            '0' if !chars.peek().is_some_and(|d| d.is_ascii_digit()) => out.push('\0'),
            '\n' => {}
            'x' => {
                let code = hex_digits(&mut chars, 2)?;
                out.push(char::from_u32(code).unwrap_or('\u{fffd}'));
            }
            'u' => {
                let code = if chars.peek() == Some(&'{') {
                    chars.next();
                    let digits: String = std::iter::from_fn(|| chars.next_if(|d| d.is_ascii_hexdigit())).collect();
                    if chars.next() != Some('}') || digits.is_empty() {
                        return Err("malformed \\u{...} escape".into());
                    }
                    u32::from_str_radix(&digits, 16).map_err(|_| "malformed \\u{...} escape".to_string())?
                } else {
                    let hi = hex_digits(&mut chars, 4)?;
                    let mut lookahead = chars.clone();
                    let low = match (lookahead.next(), lookahead.next()) {
                        (Some('\\'), Some('u')) if (0xD800..0xDC00).contains(&hi) => {
                            hex_digits(&mut lookahead, 4).ok().filter(|lo| (0xDC00..0xE000).contains(lo))
                        }
                        _ => None,
                    };
                    match low {
                        Some(lo) => {
                            chars = lookahead;
                            0x10000 + ((hi - 0xD800) << 10) + (lo - 0xDC00)
                        }
                        None => hi,
                    }
                };
                out.push(char::from_u32(code).unwrap_or('\u{fffd}'));
            }
            // any other escaped character stands for itself
            other => out.push(other),
        }
    }
    Ok(out)
}

fn hex_digits(chars: &mut std::iter::Peekable<std::str::Chars<'_>>, n: usize) -> std::result::Result<u32, String> {
    let digits: String = chars.clone().take(n).collect();
    if digits.chars().count() != n || !digits.chars().all(|d| d.is_ascii_hexdigit()) {
        return Err("malformed escape sequence".into());
    }
    for _ in 0..n {
        chars.next();
    }
    u32::from_str_radix(&digits, 16).map_err(|_| "malformed escape sequence".to_string())
}

/// Integers stay exact when they fit; whole floats collapse to integers.
fn parse_number(text: &str) -> Option<Number> {
    let mut text: String = text.chars().filter(|c| *c != '_').collect();
    if let Some(rest) = text.strip_prefix('+') {
        text = rest.to_string();
    }
    let is_float = text.contains(['.', 'e', 'E']);
    if !is_float {
        if let Ok(i) = text.parse::<i64>() {
            return Some(Number::from(i));
        }
        if let Ok(u) = text.parse::<u64>() {
            return Some(Number::from(u));
        }
    }
    // `.5` and `5.` are valid literals but not valid Rust floats
    let text = text.replace("-.", "-0.");
    let text = if text.starts_with('.') { format!("0{text}") } else { text };
    let text = text.replace(".e", ".0e").replace(".E", ".0E");
    let text = if text.ends_with('.') { format!("{text}0") } else { text };
    let f: f64 = text.parse().ok()?;
    number_from_f64(f)
}

pub(crate) fn number_from_f64(f: f64) -> Option<Number> {
    if f.is_finite() && f.fract() == 0.0 && f.abs() < 9.007_199_254_740_992e15 {
        Some(Number::from(f as i64))
    } else {
        Number::from_f64(f)
    }
}

// ------------------------------- Tests ------------------------------------ //

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(src: &str) -> Node {
        parse_builder(src, &Options::default()).unwrap_or_else(|e| panic!("{src}: {e}"))
    }

    fn parse_err(src: &str) -> ConvertError {
        parse_builder(src, &Options::default()).unwrap_err()
    }

    fn object_fields(node: &Node) -> &IndexMap<String, Node> {
        match &node.kind {
            Kind::Object { fields, .. } => fields,
            _ => panic!("expected object, got {}", node.kind_name()),
        }
    }

    #[test]
    fn prefixed_and_bare_constructors_agree() {
        let a = parse("z.object({ name: z.string(), age: z.number().int() })");
        let b = parse("object({name: string(), age: number().int()})");
        assert_eq!(parse("null()"), Node::null());
        assert_eq!(a, b);
        let fields = object_fields(&a);
        assert_eq!(fields.keys().collect::<Vec<_>>(), ["name", "age"]);
        assert_eq!(fields["age"], Node::integer());
    }

    #[test]
    fn string_checks_keep_call_order() {
        let node = parse("z.string().min(2, 'too short').max(10, { message: 'long' }).regex(/^a.*$/i).email()");
        assert_eq!(node.kind, Kind::String {
            checks: vec![
                StringCheck::Min { value: 2 },
                StringCheck::Max { value: 10 },
                StringCheck::Regex { pattern: "^a.*$".into(), flags: "i".into() },
                StringCheck::Email,
            ],
        });
    }

    #[test]
    fn number_shorthands_expand_to_bounds() {
        let node = parse("z.number().positive().lt(100).multipleOf(0.5)");
        assert_eq!(node.kind, Kind::Number {
            checks: vec![
                NumberCheck::Min { value: OrderedFloat(0.0), inclusive: false },
                NumberCheck::Max { value: OrderedFloat(100.0), inclusive: false },
                NumberCheck::MultipleOf { value: OrderedFloat(0.5) },
            ],
        });
    }

    #[test]
    fn wrappers_and_metadata() {
        let node = parse(r#"z.string().nullable().optional().describe("nick").default(null)"#);
        assert!(node.is_optional());
        assert_eq!(node.description.as_deref(), Some("nick"));
        assert_eq!(node.default, Some(Value::Null));
        assert_eq!(node.unwrapped(), &Node::string());

        let nullish = parse("z.nullish(z.boolean())");
        assert_eq!(nullish, Node::boolean().nullable().optional());
    }

    #[test]
    fn composite_constructors() {
        let node = parse(r#"z.union([z.literal("a"), z.literal(1), z.null()])"#);
        assert_eq!(node.kind, Kind::Union {
            options: vec![
                Kind::Literal { value: json!("a") }.into(),
                Kind::Literal { value: json!(1) }.into(),
                Node::null(),
            ],
        });

        let node = parse("z.tuple([z.string(), z.number()]).or(z.record(z.string(), z.boolean()))");
        let Kind::Union { options } = &node.kind else { panic!("union") };
        assert!(matches!(options[0].kind, Kind::Tuple { ref items } if items.len() == 2));
        assert_eq!(options[1].kind, Kind::Record { value: Some(Box::new(Node::boolean())) });

        assert_eq!(parse("z.record()").kind, Kind::Record { value: None });
        assert!(matches!(parse("z.enum(['x', 'y'])").kind, Kind::Enum { ref values } if values == &["x", "y"]));
        assert!(matches!(parse("z.string().and(z.string().email())").kind, Kind::Intersection { .. }));
        assert_eq!(parse("z.boolean().array().nonempty()").kind, Kind::Array {
            item: Box::new(Node::boolean()),
            checks: vec![LengthCheck::Min { value: 1 }],
        });
    }

    #[test]
    fn object_helpers_reshape_fields() {
        let node = parse(
            "z.object({ a: z.string(), b: z.number().optional(), c: z.boolean() })
                .extend({ d: z.date() })
                .omit({ c: true })
                .partial({ a: true })
                .required({ b: true })
                .passthrough()",
        );
        let Kind::Object { fields, unknown_keys } = &node.kind else { panic!("object") };
        assert_eq!(fields.keys().collect::<Vec<_>>(), ["a", "b", "d"]);
        assert!(fields["a"].is_optional());
        assert_eq!(fields["b"], Node::number());
        assert_eq!(*unknown_keys, UnknownKeys::Passthrough);

        let keys = parse("z.object({ x: z.string(), y: z.string() }).keyof()");
        assert_eq!(keys.kind, Kind::Enum { values: vec!["x".into(), "y".into()] });

        let merged = parse("z.object({ x: z.string() }).merge(z.object({ y: z.null() }).strict())");
        let Kind::Object { fields, unknown_keys } = &merged.kind else { panic!("object") };
        assert_eq!(fields.len(), 2);
        assert_eq!(*unknown_keys, UnknownKeys::Strict);
    }

    #[test]
    fn quoted_keys_comments_and_trailing_commas() {
        let node = parse(
            "z.object({
                // a comment
                'first-name': z.string(),
                \"2\": z.number(), /* inline */
            });",
        );
        assert_eq!(object_fields(&node).keys().collect::<Vec<_>>(), ["first-name", "2"]);
    }

    #[test]
    fn date_defaults_are_normalized() {
        let node = parse(r#"z.date().default(new Date("2024-02-03T04:05:06Z"))"#);
        assert_eq!(node.default, Some(json!("2024-02-03T04:05:06.000Z")));
        let node = parse("z.date().default(0)");
        assert_eq!(node.default, Some(json!("1970-01-01T00:00:00.000Z")));
        let node = parse("z.date().nullable().default(null)");
        assert_eq!(node.default, Some(Value::Null));
        let node = parse("z.object({}).default({ tags: ['a'], n: 1 })");
        assert_eq!(node.default, Some(json!({ "tags": ["a"], "n": 1 })));
    }

    #[test]
    fn opaque_and_coerced_constructors() {
        assert_eq!(parse("z.bigint()").kind, Kind::Unknown);
        assert_eq!(parse("z.any()").kind, Kind::Unknown);
        assert_eq!(parse("z.coerce.number().int()"), Node::integer());
    }

    #[test]
    fn malformed_source_is_an_evaluation_error() {
        for src in [
            "not valid code{",
            "z.string(",
            "z.strin()",
            "z.number().email()",
            "z.string().min('x')",
            "z.array()",
            "z.object({ a: 1 })",
            "z.string() z.number()",
            "z.date().default('soon')",
            "window.alert(1)",
            "",
        ] {
            let err = parse_err(src);
            assert_eq!(err.kind(), "EvaluationError", "{src:?} gave {err}");
        }
    }

    #[test]
    fn errors_point_at_the_offending_call() {
        let err = parse_err("z.object({\n  a: z.number().email()\n})");
        assert_eq!(err, ConvertError::Evaluation {
            message: "`.email()` is not available on number schemas".into(),
            line: 2,
            column: 17,
        });
    }

    #[test]
    fn plain_values_are_not_schemas() {
        for src in ["42", "'text'", "{ a: 1 }", "[z.string()]", "null"] {
            assert_eq!(parse_err(src).kind(), "InvalidSchemaInput", "{src}");
        }
    }

    #[test]
    fn nesting_is_bounded() {
        let src = format!("{}z.string(){}", "z.array(".repeat(200), ")".repeat(200));
        assert_eq!(parse_err(&src), ConvertError::DepthExceeded { limit: 100 });
        let shallow = format!("{}z.string(){}", "z.array(".repeat(20), ")".repeat(20));
        parse(&shallow);

        let brackets = format!("{}1{}", "[".repeat(100_000), "]".repeat(100_000));
        assert_eq!(parse_err(&brackets), ConvertError::DepthExceeded { limit: 100 });
    }

    #[test]
    fn wrapper_chains_count_towards_depth() {
        let chain = format!("z.string(){}", ".optional()".repeat(50_000));
        assert_eq!(parse_err(&chain), ConvertError::DepthExceeded { limit: 100 });

        let arrays = format!("z.array(z.string(){})", ".array()".repeat(50_000));
        assert_eq!(parse_err(&arrays), ConvertError::DepthExceeded { limit: 100 });

        let nullish = format!("z.number(){}", ".nullish()".repeat(60));
        assert_eq!(parse_err(&nullish), ConvertError::DepthExceeded { limit: 100 });

        let ok = format!("z.string(){}", ".nullable()".repeat(99));
        assert_eq!(parse(&ok).height(), 100);
        let over = format!("z.string(){}", ".nullable()".repeat(100));
        assert_eq!(parse_err(&over), ConvertError::DepthExceeded { limit: 100 });

        // checks and metadata leave the height alone
        let flat = format!("z.string(){}", ".min(1).describe('x')".repeat(5_000));
        assert_eq!(parse(&flat).height(), 1);
    }

    #[test]
    fn nested_objects_use_two_brackets_per_level() {
        let src = format!("{}z.string(){}", "z.object({ a: ".repeat(60), " })".repeat(60));
        assert_eq!(parse(&src).height(), 61);
    }

    #[test]
    fn literals_escapes_and_numbers() {
        let node = parse(r#"z.enum(["a\"b\n", 'é\u{1F600}', '\uD83D\uDE00', `multi
line`, '\x41\q'])"#);
        assert_eq!(node.kind, Kind::Enum {
            values: vec!["a\"b\n".into(), "é😀".into(), "😀".into(), "multi\nline".into(), "Aq".into()],
        });

        let literal = |src: &str| match parse(src).kind {
            Kind::Literal { value } => value,
            other => panic!("{src}: {other:?}"),
        };
        assert_eq!(literal("z.literal(-5)"), json!(-5));
        assert_eq!(literal("z.literal(1_000)"), json!(1000));
        assert_eq!(literal("z.literal(1e3)"), json!(1000));
        assert_eq!(literal("z.literal(.5)"), json!(0.5));
        assert_eq!(literal("z.literal(+0.25)"), json!(0.25));
        assert_eq!(literal("z.literal(18446744073709551615)"), json!(u64::MAX));
    }

    #[test]
    fn regex_literals_keep_their_source() {
        let node = parse(r"z.string().regex(/^[a-z/]+\/x$/gi)");
        assert_eq!(node.kind, Kind::String {
            checks: vec![StringCheck::Regex { pattern: r"^[a-z/]+\/x$".into(), flags: "gi".into() }],
        });
    }

    #[test]
    fn syntax_errors_carry_line_and_column() {
        let ConvertError::Evaluation { line, column, .. } = parse_err("z.object({\n  a: z.string(\n})") else {
            panic!("evaluation error");
        };
        assert_eq!((line, column), (3, 1));

        let ConvertError::Evaluation { line, .. } = parse_err("z.string('abc") else {
            panic!("evaluation error");
        };
        assert_eq!(line, 1);

        assert_eq!(parse_err("z.string(`a${b}`)").kind(), "EvaluationError");
        assert_eq!(parse_err("z.string() # b").kind(), "EvaluationError");
    }
}
