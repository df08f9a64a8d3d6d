//! Value-mode micro-templating
//!
//! Stamps titles, legends and default values with computed context. Two
//! delimiters are understood:
//!
//! - `{{expr}}` interpolates an expression, without any escaping
//! - `{[ if expr ]} ... {[ else ]} ... {[ end ]}` evaluates a conditional block
//!
//! Expressions are deliberately tiny: `idx`, `value`, dotted lookups into
//! the template data, `getValue("some.key")`, string/number/boolean
//! literals and `!expr`. Markup rendering lives in [`super::markup`]; the two
//! engines are not shared because only markup output is HTML-escaped.

use std::borrow::Cow;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

use crate::errors::FormError;

static TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{([\s\S]+?)\}\}|\{\[([\s\S]+?)\]\}").expect("valid regex"));
static VALUES_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{values\.([^}]+)\}\}").expect("valid regex"));
static GET_VALUE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^getValue\(\s*(?:"([^"]*)"|'([^']*)')\s*\)$"#).expect("valid regex")
});
static IDENT_PATH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_$][\w$]*(\.[\w$]+)*$").expect("valid regex"));

/// Callback resolving another field's value by key
pub type GetValueFn<'a> = dyn Fn(&str) -> Result<Option<Value>, FormError> + 'a;

/// Data a value template is evaluated against
pub struct TemplateContext<'a> {
    /// 1-based position of the node in its array (or among its siblings)
    pub idx: usize,
    /// Value bound to `value` (the legend child's value, usually empty)
    pub value: Value,
    /// Host-supplied template data (`tpldata`)
    pub data: &'a Map<String, Value>,
    /// Resolver behind `getValue(...)`
    pub get_value: Option<&'a GetValueFn<'a>>,
}

impl<'a> TemplateContext<'a> {
    pub fn new(idx: usize, data: &'a Map<String, Value>) -> Self {
        Self {
            idx,
            value: Value::String(String::new()),
            data,
            get_value: None,
        }
    }

    pub fn with_value(mut self, value: Value) -> Self {
        self.value = value;
        self
    }

    pub fn with_get_value(mut self, get_value: &'a GetValueFn<'a>) -> Self {
        self.get_value = Some(get_value);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Lookup(Vec<String>),
    GetValue(String),
    Literal(Value),
    Not(Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Text(String),
    Interp(Expr),
    If {
        cond: Expr,
        then: Vec<Node>,
        otherwise: Vec<Node>,
    },
}

struct Frame {
    cond: Option<Expr>,
    then: Vec<Node>,
    otherwise: Vec<Node>,
    in_else: bool,
}

impl Frame {
    fn new(cond: Option<Expr>) -> Self {
        Self {
            cond,
            then: Vec::new(),
            otherwise: Vec::new(),
            in_else: false,
        }
    }

    fn active(&mut self) -> &mut Vec<Node> {
        if self.in_else {
            &mut self.otherwise
        } else {
            &mut self.then
        }
    }
}

/// Rewrite `{{values.PATH}}` into `{{getValue("PATH")}}`
pub fn rewrite_value_markers(template: &str) -> Cow<'_, str> {
    VALUES_MARKER.replace_all(template, "{{getValue(\"$1\")}}")
}

/// `true` when the string contains any template delimiter
pub fn has_template_markup(template: &str) -> bool {
    template.contains("{{") || template.contains("{[")
}

/// Evaluate a value template against a context
pub fn render_value_template(template: &str, ctx: &TemplateContext<'_>) -> Result<String, FormError> {
    if !has_template_markup(template) {
        return Ok(template.to_string());
    }
    let nodes = parse_template(template)?;
    let mut out = String::with_capacity(template.len());
    render_nodes(&nodes, ctx, &mut out)?;
    Ok(out)
}

/// Rewrite `{{values.X}}` markers, then evaluate
pub fn expand(template: &str, ctx: &TemplateContext<'_>) -> Result<String, FormError> {
    let rewritten = rewrite_value_markers(template);
    render_value_template(&rewritten, ctx)
}

fn parse_template(src: &str) -> Result<Vec<Node>, FormError> {
    let mut stack = vec![Frame::new(None)];
    let mut last = 0;

    for caps in TOKEN.captures_iter(src) {
        let whole = caps.get(0).map(|m| (m.start(), m.end())).unwrap_or((last, last));
        let frame = stack.last_mut().ok_or_else(|| FormError::Template("empty block stack".into()))?;
        if whole.0 > last {
            frame.active().push(Node::Text(src[last..whole.0].to_string()));
        }
        last = whole.1;

        if let Some(expr) = caps.get(1) {
            frame.active().push(Node::Interp(parse_expr(expr.as_str())?));
            continue;
        }

        let stmt = caps.get(2).map(|m| m.as_str().trim()).unwrap_or("");
        if let Some(cond) = stmt.strip_prefix("if ") {
            stack.push(Frame::new(Some(parse_expr(cond)?)));
        } else if stmt == "else" {
            if frame.cond.is_none() || frame.in_else {
                return Err(FormError::Template(format!("unexpected 'else' in '{}'", src)));
            }
            frame.in_else = true;
        } else if stmt == "end" || stmt == "endif" {
            let closed = match stack.pop() {
                Some(Frame { cond: Some(cond), then, otherwise, .. }) => Node::If { cond, then, otherwise },
                _ => return Err(FormError::Template(format!("unexpected '{}' in '{}'", stmt, src))),
            };
            stack
                .last_mut()
                .ok_or_else(|| FormError::Template(format!("unbalanced blocks in '{}'", src)))?
                .active()
                .push(closed);
        } else {
            return Err(FormError::Template(format!("unsupported statement '{}'", stmt)));
        }
    }

    if stack.len() != 1 {
        return Err(FormError::Template(format!("unclosed 'if' block in '{}'", src)));
    }
    let mut root = stack.pop().ok_or_else(|| FormError::Template("empty block stack".into()))?;
    if last < src.len() {
        root.then.push(Node::Text(src[last..].to_string()));
    }
    Ok(root.then)
}

fn parse_expr(src: &str) -> Result<Expr, FormError> {
    let s = src.trim();
    if let Some(rest) = s.strip_prefix('!') {
        return Ok(Expr::Not(Box::new(parse_expr(rest)?)));
    }
    if let Some(caps) = GET_VALUE.captures(s) {
        let key = caps.get(1).or_else(|| caps.get(2)).map(|m| m.as_str()).unwrap_or("");
        return Ok(Expr::GetValue(key.to_string()));
    }
    if s.len() >= 2 && ((s.starts_with('"') && s.ends_with('"')) || (s.starts_with('\'') && s.ends_with('\''))) {
        return Ok(Expr::Literal(Value::String(s[1..s.len() - 1].to_string())));
    }
    match s {
        "true" => return Ok(Expr::Literal(Value::Bool(true))),
        "false" => return Ok(Expr::Literal(Value::Bool(false))),
        "null" => return Ok(Expr::Literal(Value::Null)),
        _ => {}
    }
    if let Ok(int) = s.parse::<i64>() {
        return Ok(Expr::Literal(Value::from(int)));
    }
    if let Ok(float) = s.parse::<f64>() {
        return Ok(Expr::Literal(Value::from(float)));
    }
    if IDENT_PATH.is_match(s) {
        return Ok(Expr::Lookup(s.split('.').map(str::to_string).collect()));
    }
    Err(FormError::Template(format!("unsupported expression '{}'", s)))
}

fn eval(expr: &Expr, ctx: &TemplateContext<'_>) -> Result<Value, FormError> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Not(inner) => Ok(Value::Bool(!truthy(&eval(inner, ctx)?))),
        Expr::GetValue(key) => match ctx.get_value {
            Some(get_value) => Ok(get_value(key)?.unwrap_or(Value::Null)),
            None => Ok(Value::Null),
        },
        Expr::Lookup(path) => {
            let (head, rest) = match path.split_first() {
                Some(split) => split,
                None => return Ok(Value::Null),
            };
            let mut current = match head.as_str() {
                "idx" => Value::from(ctx.idx),
                "value" => ctx.value.clone(),
                other => ctx.data.get(other).cloned().unwrap_or(Value::Null),
            };
            for part in rest {
                current = current.get(part.as_str()).cloned().unwrap_or(Value::Null);
            }
            Ok(current)
        }
    }
}

fn render_nodes(nodes: &[Node], ctx: &TemplateContext<'_>, out: &mut String) -> Result<(), FormError> {
    for node in nodes {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Interp(expr) => out.push_str(&display(&eval(expr, ctx)?)),
            Node::If { cond, then, otherwise } => {
                if truthy(&eval(cond, ctx)?) {
                    render_nodes(then, ctx, out)?;
                } else {
                    render_nodes(otherwise, ctx, out)?;
                }
            }
        }
    }
    Ok(())
}

/// Truthiness the way form authors expect it from templates
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// String shown for an interpolated value
pub fn display(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn data() -> Map<String, Value> {
        json!({"user": {"name": "Ada"}, "site": "forms"})
            .as_object()
            .cloned()
            .unwrap()
    }

    #[test]
    fn test_interpolates_idx_value_and_data() {
        let data = data();
        let ctx = TemplateContext::new(3, &data).with_value(json!("blue"));
        let out = render_value_template("#{{idx}} {{value}} {{user.name}}@{{site}}", &ctx).unwrap();
        assert_eq!(out, "#3 blue Ada@forms");
    }

    #[test]
    fn test_no_html_escaping() {
        let data = Map::new();
        let ctx = TemplateContext::new(1, &data).with_value(json!("<b>&</b>"));
        assert_eq!(render_value_template("{{value}}", &ctx).unwrap(), "<b>&</b>");
    }

    #[test]
    fn test_missing_lookup_renders_empty() {
        let data = Map::new();
        let ctx = TemplateContext::new(1, &data);
        assert_eq!(render_value_template("a{{nothing.here}}b", &ctx).unwrap(), "ab");
    }

    #[test]
    fn test_values_marker_calls_get_value() {
        let data = Map::new();
        let lookup = |key: &str| -> Result<Option<Value>, FormError> {
            Ok(Some(json!(format!("<{}>", key))))
        };
        let ctx = TemplateContext::new(1, &data).with_get_value(&lookup);
        let out = expand("Hello {{values.person.name}}!", &ctx).unwrap();
        assert_eq!(out, "Hello <person.name>!");
    }

    #[test]
    fn test_conditional_blocks() {
        let data = Map::new();
        let ctx = TemplateContext::new(2, &data).with_value(json!(""));
        let template = "{[ if value ]}has {{value}}{[ else ]}empty #{{idx}}{[ end ]}";
        assert_eq!(render_value_template(template, &ctx).unwrap(), "empty #2");

        let ctx = TemplateContext::new(2, &data).with_value(json!("x"));
        assert_eq!(render_value_template(template, &ctx).unwrap(), "has x");
        assert_eq!(render_value_template("{[ if !value ]}no{[ endif ]}", &ctx).unwrap(), "");
    }

    #[test]
    fn test_unbalanced_blocks_fail() {
        let data = Map::new();
        let ctx = TemplateContext::new(1, &data);
        assert!(render_value_template("{[ if value ]}open", &ctx).is_err());
        assert!(render_value_template("{[ end ]}", &ctx).is_err());
        assert!(render_value_template("{{ a + b }}", &ctx).is_err());
    }
}
