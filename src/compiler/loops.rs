//! Loop expansion
//!
//! A literal sequence is unrolled into one block per element. A templated
//! string becomes a single loop over the sequence it evaluates to at run time.

use crate::compiler::fragment::CodeFragment;
use crate::compiler::import::Classified;
use crate::compiler::invoke;
use crate::compiler::ir::Step;
use crate::compiler::literal::Literal;
use crate::compiler::template;
use crate::compiler::CompilationContext;
use crate::config::Task;
use crate::error::{CompileError, CompileResult};
use serde_json::{json, Value};

/// Compile a looping task into a body fragment
pub fn expand_loop(
    source: &Value,
    classified: &Classified,
    task: &Task,
    ctx: &CompilationContext,
) -> CompileResult<CodeFragment> {
    let steps = loop_steps(source, classified, &task.args, ctx)?;
    Ok(CodeFragment::body(steps, ctx.naming, ctx.indent))
}

/// Steps of a looping invocation
pub fn loop_steps(
    source: &Value,
    classified: &Classified,
    args: &[Value],
    ctx: &CompilationContext,
) -> CompileResult<Vec<Step>> {
    match source {
        Value::String(text) if template::is_templated(text) => {
            let source = ctx.folder().fold_expression(text)?;
            let body = invoke::invocation_steps(classified, args, ctx)?;
            Ok(vec![Step::Loop { source, body }])
        }
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(index, item)| unrolled_block(index, item, classified, args, ctx))
            .collect(),
        Value::String(text) if text.trim().is_empty() => {
            Err(CompileError::InvalidLoop("empty loop source".to_string()))
        }
        Value::String(text) => Err(CompileError::InvalidLoop(format!(
            "{:?} is neither a sequence nor a template",
            text
        ))),
        other => Err(CompileError::InvalidLoop(other.to_string())),
    }
}

fn unrolled_block(
    index: usize,
    item: &Value,
    classified: &Classified,
    args: &[Value],
    ctx: &CompilationContext,
) -> CompileResult<Step> {
    let naming = ctx.naming;
    let item = ctx.folder().reconstruct(item)?;

    let mut bindings = ctx.bindings.clone();
    bindings.insert(naming.index.clone(), json!(index));
    if let Some(value) = item.constant() {
        bindings.insert(naming.item.clone(), value);
    }
    let inner = ctx.with_bindings(&bindings);

    let mut body = vec![
        Step::Declare {
            name: naming.item.clone(),
            value: item,
        },
        Step::Declare {
            name: naming.index.clone(),
            value: Literal::Const(json!(index)),
        },
    ];
    body.extend(invoke::invocation_steps(classified, args, &inner)?);
    Ok(Step::Block { body })
}
