//! Import classification
//!
//! Decides what a task invokes and which binding, if any, has to be imported
//! for it: a user module (`from`), a built-in, or nothing at all for the
//! reserved target, commands and host globals.

use crate::compiler::fragment::CodeFragment;
use crate::compiler::ir::{Import, ImportSource};
use crate::compiler::literal::is_identifier;
use crate::compiler::template;
use crate::compiler::CompilationContext;
use crate::config::Task;
use crate::error::{CompileError, CompileResult};
use colored::Colorize;

/// What a task invokes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationKind {
    /// Call a function and store its value
    Default,

    /// Declare bindings
    SetVars,

    /// Spawn an external program
    Command,
}

/// A classified task
#[derive(Debug, Clone, PartialEq)]
pub struct Classified {
    /// Invocation kind
    pub kind: InvocationKind,

    /// Call target, or the program name of a command
    pub target: String,

    /// Rendered import source
    pub from: Option<String>,

    /// Imports and diagnostics of the task
    pub fragment: CodeFragment,
}

impl Classified {
    fn new(kind: InvocationKind, target: String) -> Self {
        Classified {
            kind,
            target,
            from: None,
            fragment: CodeFragment::new(),
        }
    }
}

/// Classify one task
pub fn classify(task: &Task, ctx: &CompilationContext) -> CompileResult<Classified> {
    let naming = ctx.naming;

    let target = match task.r#use.as_deref().map(str::trim) {
        Some(name) if !name.is_empty() => render(name, ctx)?.trim().to_string(),
        _ => naming.default_use.clone(),
    };

    if target == naming.set_vars {
        return Ok(Classified::new(InvocationKind::SetVars, target));
    }

    if let Some(program) = target.strip_prefix(naming.command_sigil.as_str()) {
        let program = program.trim();
        if !program.is_empty() {
            let mut classified = Classified::new(InvocationKind::Command, program.to_string());
            classified.fragment = CodeFragment::diagnostic(format!("run {}", program.green()));
            return Ok(classified);
        }
    }

    let from = match task.from.as_deref().map(str::trim) {
        Some(from) if !from.is_empty() => Some(render(from, ctx)?),
        _ => None,
    };

    if let Some(from) = from.filter(|from| !from.trim().is_empty()) {
        return import_module(target, from, ctx);
    }

    if ctx.registry.contains(&target) {
        let root = root_segment(&target)?;
        let import = Import {
            binding: root.to_string(),
            source: ImportSource::Builtin {
                name: root.to_string(),
            },
        };
        let mut classified = Classified::new(InvocationKind::Default, target.clone());
        classified.fragment = CodeFragment::import(import, naming).append(
            CodeFragment::diagnostic(format!("use {} from built-ins", target.green())),
        );
        return Ok(classified);
    }

    if ctx.evaluator.is_global_function(&target) {
        return Ok(Classified::new(InvocationKind::Default, target));
    }

    Err(CompileError::UnresolvedTarget(target))
}

fn import_module(target: String, from: String, ctx: &CompilationContext) -> CompileResult<Classified> {
    let naming = ctx.naming;

    let (target, import) = if target == naming.default_use {
        let binding = format!("{}_{}", naming.default_use, ctx.task_index);
        let import = Import {
            binding: binding.clone(),
            source: ImportSource::Module {
                from: from.clone(),
                export: None,
            },
        };
        (binding, import)
    } else {
        let root = root_segment(&target)?.to_string();
        let import = Import {
            binding: root.clone(),
            source: ImportSource::Module {
                from: from.clone(),
                export: Some(root),
            },
        };
        (target, import)
    };

    let diagnostic = format!("use {} from {:?}", target.green(), from);
    Ok(Classified {
        kind: InvocationKind::Default,
        fragment: CodeFragment::import(import, naming).append(CodeFragment::diagnostic(diagnostic)),
        target,
        from: Some(from),
    })
}

/// Render a templated `use` or `from` against the public context
fn render(text: &str, ctx: &CompilationContext) -> CompileResult<String> {
    if !template::is_templated(text) {
        return Ok(template::parse(text)?
            .into_iter()
            .map(|segment| match segment {
                template::Segment::Text(text) | template::Segment::Expr(text) => text,
            })
            .collect());
    }
    let template = template::compile(text, ctx.public.keys().cloned())?;
    Ok(template.render(ctx.evaluator, ctx.public)?)
}

fn root_segment(target: &str) -> CompileResult<&str> {
    let root = target.split('.').next().unwrap_or(target);
    if is_identifier(root) {
        Ok(root)
    } else {
        Err(CompileError::InvalidBinding(root.to_string()))
    }
}
