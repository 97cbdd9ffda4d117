//! Placeholder templates
//!
//! A template is text with `${expression}` placeholders. A backslash right
//! before the marker (`\${...}`) escapes it, and the placeholder is kept as
//! literal text without the backslash.

use crate::error::{EvalResult, TemplateError, TemplateResult};
use crate::eval::{Bindings, Evaluator};
use regex::Regex;
use std::sync::LazyLock;

/// Start of a placeholder, with the optional escaping backslash
static MARKER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\\?\$\{").unwrap());

/// A piece of parsed template text
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Literal text, emitted verbatim
    Text(String),

    /// Trimmed expression source of a placeholder
    Expr(String),
}

/// Whether the text contains at least one active placeholder marker
pub fn is_templated(text: &str) -> bool {
    MARKER
        .find_iter(text)
        .any(|m| !m.as_str().starts_with('\\'))
}

/// Split text into literal and expression segments
///
/// Adjacent literal text is merged, so segments alternate where possible.
pub fn parse(text: &str) -> TemplateResult<Vec<Segment>> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut pos = 0;

    while let Some(m) = MARKER.find_at(text, pos) {
        let escaped = m.as_str().starts_with('\\');
        literal.push_str(&text[pos..m.start()]);

        match closing_brace(text, m.end()) {
            Some(close) => {
                let raw = &text[m.start()..=close];
                if escaped {
                    literal.push_str(&raw[1..]);
                } else {
                    let expr = text[m.end()..close].trim();
                    if expr.is_empty() {
                        return Err(TemplateError::EmptyExpression(raw.to_string()));
                    }
                    if !literal.is_empty() {
                        segments.push(Segment::Text(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Expr(expr.to_string()));
                }
                pos = close + 1;
            }
            None if escaped => {
                literal.push_str(&text[m.start() + 1..m.end()]);
                pos = m.end();
            }
            None => return Err(TemplateError::Malformed(text[m.start()..].to_string())),
        }
    }

    literal.push_str(&text[pos..]);
    if !literal.is_empty() {
        segments.push(Segment::Text(literal));
    }
    Ok(segments)
}

/// Find the `}` closing a placeholder opened right before `start`
///
/// Nested braces and quoted strings inside the expression are skipped.
fn closing_brace(text: &str, start: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut quote: Option<u8> = None;
    let mut i = start;

    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(q) => {
                if b == b'\\' {
                    i += 1;
                } else if b == q {
                    quote = None;
                }
            }
            None => match b {
                b'"' | b'\'' => quote = Some(b),
                b'{' => depth += 1,
                b'}' if depth == 0 => return Some(i),
                b'}' => depth -= 1,
                _ => {}
            },
        }
        i += 1;
    }
    None
}

/// A parsed template bound to the names it may read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    segments: Vec<Segment>,
    keys: Vec<String>,
}

/// Parse `text` into a reusable template over `keys`
pub fn compile<I, S>(text: &str, keys: I) -> TemplateResult<Template>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    Ok(Template {
        segments: parse(text)?,
        keys: keys.into_iter().map(Into::into).collect(),
    })
}

impl Template {
    /// Render the template, evaluating each placeholder
    ///
    /// Only the known keys are read from `bindings`; a known key missing from
    /// them is bound to `nil`.
    pub fn render(&self, evaluator: &Evaluator, bindings: &Bindings) -> EvalResult<String> {
        let scope = evaluator.root_scope()?;
        for key in &self.keys {
            let value = bindings.get(key).cloned().unwrap_or_default();
            scope.declare(key, evaluator.to_lua(&value)?)?;
        }

        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Expr(expr) => {
                    let value = evaluator.eval_in(expr, &scope)?;
                    out.push_str(&evaluator.display(value)?);
                }
            }
        }
        Ok(out)
    }
}

/// Lua source of a function rendering `text`
///
/// The function takes the bindings table as `param` (normally
/// `NamingConfig::context_param`) and declares one local per known key.
pub fn precompile<I, S>(text: &str, keys: I, param: &str) -> TemplateResult<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let template = compile(text, keys)?;
    let mut source = format!("function({}) ", param);
    for key in &template.keys {
        source.push_str(&format!("local {} = {}[{}]; ", key, param, quote(key)));
    }
    source.push_str("return ");
    source.push_str(&concat_source(&template.segments));
    source.push_str(" end");
    Ok(source)
}

/// Lua expression concatenating the segments into one string
pub fn concat_source(segments: &[Segment]) -> String {
    if segments.is_empty() {
        return quote("");
    }
    segments
        .iter()
        .map(|segment| match segment {
            Segment::Text(text) => quote(text),
            Segment::Expr(expr) => format!("tostring({})", expr),
        })
        .collect::<Vec<_>>()
        .join(" .. ")
}

/// Quote text as a Lua string literal
pub fn quote(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for c in text.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_ascii_control() => out.push_str(&format!("\\{:03}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}
