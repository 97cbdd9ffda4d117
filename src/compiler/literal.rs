//! Literal reconstruction
//!
//! Argument values are rebuilt as [`Literal`] trees. Every string leaf goes
//! through the known-keys partial evaluator: a placeholder whose names are
//! known now is folded into a constant, one that references a name bound only
//! at run time is deferred.

use crate::compiler::template::{self, quote, Segment};
use crate::error::{CompileError, CompileResult, EvalError};
use crate::eval::{stringify, Bindings, Evaluator};
use serde_json::Value as JsonValue;
use std::collections::HashSet;

/// Lua keywords, which can't be used as bare names
const LUA_KEYWORDS: &[&str] = &[
    "and", "break", "do", "else", "elseif", "end", "false", "for", "function", "goto", "if",
    "in", "local", "nil", "not", "or", "repeat", "return", "then", "true", "until", "while",
];

/// A reconstructed value, ready to embed or evaluate
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    /// Value known at compile time
    Const(JsonValue),

    /// String interpolated at run time; holds at least one expression segment
    Deferred(Vec<Segment>),

    /// Expression evaluated at run time, keeping the type of its value
    Expr(String),

    /// Ordered sequence
    Seq(Vec<Literal>),

    /// Keyed mapping, in source order
    Map(Vec<(String, Literal)>),
}

impl Literal {
    /// The value, when the whole tree is known at compile time
    pub fn constant(&self) -> Option<JsonValue> {
        match self {
            Literal::Const(value) => Some(value.clone()),
            Literal::Deferred(_) | Literal::Expr(_) => None,
            Literal::Seq(items) => items
                .iter()
                .map(Literal::constant)
                .collect::<Option<Vec<_>>>()
                .map(JsonValue::Array),
            Literal::Map(entries) => entries
                .iter()
                .map(|(key, value)| value.constant().map(|v| (key.clone(), v)))
                .collect::<Option<serde_json::Map<_, _>>>()
                .map(JsonValue::Object),
        }
    }

    /// Lua source of this literal
    pub fn to_source(&self) -> String {
        match self {
            Literal::Const(value) => const_source(value),
            Literal::Deferred(segments) => template::concat_source(segments),
            Literal::Expr(expr) => expr.clone(),
            Literal::Seq(items) => table_source(items.iter().map(Literal::to_source)),
            Literal::Map(entries) => table_source(
                entries
                    .iter()
                    .map(|(key, value)| format!("{} = {}", table_key(key), value.to_source())),
            ),
        }
    }
}

/// Known-keys partial evaluator
pub struct Folder<'a> {
    evaluator: &'a Evaluator,
    bindings: &'a Bindings,
    runtime_names: Option<&'a HashSet<String>>,
}

impl<'a> Folder<'a> {
    /// Fold against `bindings`, deferring every unbound name
    pub fn new(evaluator: &'a Evaluator, bindings: &'a Bindings) -> Self {
        Folder {
            evaluator,
            bindings,
            runtime_names: None,
        }
    }

    /// Only defer names in `runtime_names`; any other unbound name is an error
    pub fn strict(mut self, runtime_names: &'a HashSet<String>) -> Self {
        self.runtime_names = Some(runtime_names);
        self
    }

    /// Rebuild a value, folding every string leaf
    pub fn reconstruct(&self, value: &JsonValue) -> CompileResult<Literal> {
        match value {
            JsonValue::String(text) => self.fold(text),
            JsonValue::Array(items) => Ok(Literal::Seq(
                items
                    .iter()
                    .map(|item| self.reconstruct(item))
                    .collect::<CompileResult<_>>()?,
            )),
            JsonValue::Object(map) => Ok(Literal::Map(
                map.iter()
                    .map(|(key, value)| Ok((key.clone(), self.reconstruct(value)?)))
                    .collect::<CompileResult<_>>()?,
            )),
            other => Ok(Literal::Const(other.clone())),
        }
    }

    /// Fold the placeholders of one string
    ///
    /// A string made of a single placeholder keeps the type of its folded
    /// value; otherwise folded values are spliced in as text.
    pub fn fold(&self, text: &str) -> CompileResult<Literal> {
        let segments = template::parse(text)?;

        if let [Segment::Expr(expr)] = segments.as_slice() {
            return Ok(match self.try_eval(expr)? {
                Some(value) => Literal::Const(value),
                None => Literal::Deferred(segments),
            });
        }

        let mut folded: Vec<Segment> = Vec::with_capacity(segments.len());
        for segment in segments {
            match segment {
                Segment::Text(text) => push_text(&mut folded, text),
                Segment::Expr(expr) => match self.try_eval(&expr)? {
                    Some(value) => push_text(&mut folded, stringify(&value)),
                    None => folded.push(Segment::Expr(expr)),
                },
            }
        }

        if folded.iter().any(|s| matches!(s, Segment::Expr(_))) {
            return Ok(Literal::Deferred(folded));
        }
        let text = folded
            .into_iter()
            .map(|segment| match segment {
                Segment::Text(text) | Segment::Expr(text) => text,
            })
            .collect::<String>();
        Ok(Literal::Const(JsonValue::String(text)))
    }

    /// Fold a string whose value is used as is (a loop source)
    ///
    /// Unlike [`Folder::fold`], a lone deferred placeholder stays a typed
    /// expression instead of becoming a string.
    pub fn fold_expression(&self, text: &str) -> CompileResult<Literal> {
        match self.fold(text)? {
            Literal::Deferred(segments) => match segments.as_slice() {
                [Segment::Expr(expr)] => Ok(Literal::Expr(expr.clone())),
                _ => Ok(Literal::Deferred(segments)),
            },
            other => Ok(other),
        }
    }

    fn try_eval(&self, expr: &str) -> CompileResult<Option<JsonValue>> {
        match self.evaluator.evaluate(expr, self.bindings) {
            Ok(value) => Ok(Some(value)),
            Err(EvalError::Unbound(name)) => match self.runtime_names {
                Some(names) if !names.contains(&name) => Err(CompileError::UndefinedName(name)),
                _ => {
                    tracing::trace!("deferring `{}` ({} is unbound)", expr, name);
                    Ok(None)
                }
            },
            Err(err) => Err(err.into()),
        }
    }
}

fn push_text(segments: &mut Vec<Segment>, text: String) {
    if let Some(Segment::Text(last)) = segments.last_mut() {
        last.push_str(&text);
    } else if !text.is_empty() {
        segments.push(Segment::Text(text));
    }
}

/// Whether `name` can be used as a bare Lua name
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_') && !LUA_KEYWORDS.contains(&name)
}

fn table_key(key: &str) -> String {
    if is_identifier(key) {
        key.to_string()
    } else {
        format!("[{}]", quote(key))
    }
}

fn table_source(items: impl Iterator<Item = String>) -> String {
    let items: Vec<String> = items.collect();
    if items.is_empty() {
        "{}".to_string()
    } else {
        format!("{{{}}}", items.join(", "))
    }
}

fn const_source(value: &JsonValue) -> String {
    match value {
        JsonValue::Null => "nil".to_string(),
        JsonValue::Bool(b) => b.to_string(),
        JsonValue::Number(n) => n.to_string(),
        JsonValue::String(s) => quote(s),
        JsonValue::Array(items) => table_source(items.iter().map(const_source)),
        JsonValue::Object(map) => table_source(
            map.iter()
                .map(|(key, value)| format!("{} = {}", table_key(key), const_source(value))),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TemplateError;
    use serde_json::json;

    fn public() -> Bindings {
        json!({"build": {"env": {}, "os": {"name": "macos"}}})
            .as_object()
            .cloned()
            .unwrap()
    }

    #[test]
    fn test_plain_string() {
        let eval = Evaluator::new();
        let ctx = public();
        let literal = Folder::new(&eval, &ctx).fold("hello").unwrap();
        assert_eq!(literal, Literal::Const(json!("hello")));
        assert_eq!(literal.to_source(), r#""hello""#);
    }

    #[test]
    fn test_fold_known_names() {
        let eval = Evaluator::new();
        let ctx = public();
        let folder = Folder::new(&eval, &ctx);
        assert_eq!(
            folder.fold("${build.os.name}").unwrap(),
            Literal::Const(json!("macos"))
        );
        assert_eq!(
            folder.fold("test${build.os.name}22").unwrap(),
            Literal::Const(json!("testmacos22"))
        );
    }

    #[test]
    fn test_defer_unknown_names() {
        let eval = Evaluator::new();
        let ctx = public();
        let literal = Folder::new(&eval, &ctx).fold("${env.name}").unwrap();
        assert_eq!(
            literal,
            Literal::Deferred(vec![Segment::Expr("env.name".to_string())])
        );
        assert_eq!(literal.to_source(), "tostring(env.name)");
        assert!(literal.constant().is_none());
    }

    #[test]
    fn test_fold_expression_keeps_type() {
        let eval = Evaluator::new();
        let ctx = public();
        let folder = Folder::new(&eval, &ctx);
        assert_eq!(
            folder.fold_expression("${result}").unwrap(),
            Literal::Expr("result".to_string())
        );
        assert_eq!(folder.fold_expression("${result}").unwrap().to_source(), "result");
        assert!(matches!(
            folder.fold_expression("a ${result}").unwrap(),
            Literal::Deferred(_)
        ));
    }

    #[test]
    fn test_partial_fold() {
        let eval = Evaluator::new();
        let ctx = public();
        let literal = Folder::new(&eval, &ctx)
            .fold("${build.os.name}-${item}!")
            .unwrap();
        assert_eq!(
            literal,
            Literal::Deferred(vec![
                Segment::Text("macos-".to_string()),
                Segment::Expr("item".to_string()),
                Segment::Text("!".to_string()),
            ])
        );
        assert_eq!(literal.to_source(), r#""macos-" .. tostring(item) .. "!""#);
    }

    #[test]
    fn test_single_placeholder_keeps_type() {
        let eval = Evaluator::new();
        let ctx = json!({"item": 1, "index": 0}).as_object().cloned().unwrap();
        let folder = Folder::new(&eval, &ctx);
        assert_eq!(folder.fold("${index}").unwrap(), Literal::Const(json!(0)));
        assert_eq!(folder.fold("${item}").unwrap().to_source(), "1");
        assert_eq!(
            folder.fold("${index+1}1234567").unwrap(),
            Literal::Const(json!("11234567"))
        );
    }

    #[test]
    fn test_non_string_values_splice_as_json() {
        let eval = Evaluator::new();
        let ctx = json!({"list": [1, 2]}).as_object().cloned().unwrap();
        let literal = Folder::new(&eval, &ctx).fold("items: ${list}").unwrap();
        assert_eq!(literal, Literal::Const(json!("items: [1,2]")));
    }

    #[test]
    fn test_fully_known_leaves_no_expressions() {
        let eval = Evaluator::new();
        let ctx = public();
        let folder = Folder::new(&eval, &ctx);
        for text in ["${build.os.name}", "a ${build.os.name} b ${ 1 + 2 }", "\\${x}"] {
            assert!(folder.fold(text).unwrap().constant().is_some(), "{}", text);
        }
    }

    #[test]
    fn test_escaped_marker_stays_literal() {
        let eval = Evaluator::new();
        let ctx = public();
        let literal = Folder::new(&eval, &ctx).fold("\\${item}").unwrap();
        assert_eq!(literal, Literal::Const(json!("${item}")));
    }

    #[test]
    fn test_reconstruct_mapping() {
        let eval = Evaluator::new();
        let ctx = public();
        let value = json!({
            "content": "Deno",
            "name": "${name}222",
            "os": "${build.os.name}",
            "obj": {"name": "test${build.os.name}22"},
        });
        let literal = Folder::new(&eval, &ctx).reconstruct(&value).unwrap();
        assert_eq!(
            literal.to_source(),
            r#"{content = "Deno", name = tostring(name) .. "222", os = "macos", obj = {name = "testmacos22"}}"#
        );
    }

    #[test]
    fn test_reconstruct_sequence_and_scalars() {
        let eval = Evaluator::new();
        let ctx = public();
        let value = json!([1, 2.5, true, null, "x", {"my-key": []}]);
        let literal = Folder::new(&eval, &ctx).reconstruct(&value).unwrap();
        assert_eq!(
            literal.to_source(),
            r#"{1, 2.5, true, nil, "x", {["my-key"] = {}}}"#
        );
        assert_eq!(literal.constant(), Some(value));
    }

    #[test]
    fn test_other_errors_propagate() {
        let eval = Evaluator::new();
        let ctx = public();
        let result = Folder::new(&eval, &ctx).fold("${build.missing.name}");
        assert!(matches!(result, Err(CompileError::Eval(EvalError::Lua(_)))));
    }

    #[test]
    fn test_template_errors_propagate() {
        let eval = Evaluator::new();
        let ctx = public();
        let result = Folder::new(&eval, &ctx).fold("${ }");
        assert!(matches!(
            result,
            Err(CompileError::Template(TemplateError::EmptyExpression(_)))
        ));
    }

    #[test]
    fn test_strict_rejects_names_never_bound() {
        let eval = Evaluator::new();
        let ctx = public();
        let names: HashSet<String> = ["item".to_string()].into_iter().collect();
        let folder = Folder::new(&eval, &ctx).strict(&names);

        assert!(folder.fold("${item}").is_ok());
        let result = folder.fold("${itme}");
        assert!(matches!(result, Err(CompileError::UndefinedName(ref n)) if n == "itme"));
    }

    #[test]
    fn test_is_identifier() {
        assert!(is_identifier("name"));
        assert!(is_identifier("_x1"));
        assert!(!is_identifier("1x"));
        assert!(!is_identifier("my-key"));
        assert!(!is_identifier("end"));
        assert!(!is_identifier(""));
    }
}
