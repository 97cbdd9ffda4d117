//! Task compiler
//!
//! Turns a task list into a [`CompiledProgram`]. Each task is classified
//! (what it invokes and what must be imported), optionally expanded into a
//! loop, and compiled into a [`CodeFragment`]; the [`Assembler`] joins the
//! fragments in task order.

pub mod fragment;
pub mod import;
pub mod invoke;
pub mod ir;
pub mod literal;
pub mod loops;
pub mod template;

pub use fragment::{Assembler, CodeFragment, CompiledProgram, Program};
pub use import::{classify, Classified, InvocationKind};
pub use ir::{Import, ImportSource, Step};
pub use literal::{Folder, Literal};
pub use template::{is_templated, precompile, Segment, Template};

use crate::config::{CompilerConfig, NamingConfig, Task};
use crate::context::PublicContext;
use crate::error::CompileResult;
use crate::eval::{Bindings, Evaluator};
use crate::runner::builtins::Registry;
use colored::Colorize;
use std::collections::HashSet;

/// Compiler settings
#[derive(Debug, Clone, PartialEq)]
pub struct CompileOptions {
    /// Values known at compile time
    pub public: PublicContext,

    /// Extra indentation of the generated body
    pub indent: usize,

    /// Names used in generated code
    pub naming: NamingConfig,

    /// Fail on names that are unbound now and never bound at run time
    pub strict_names: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        CompileOptions {
            public: PublicContext::default(),
            indent: 0,
            naming: NamingConfig::default(),
            strict_names: false,
        }
    }
}

impl CompileOptions {
    /// Options taken from a compiler settings file
    pub fn from_config(config: CompilerConfig) -> Self {
        CompileOptions {
            naming: config.naming,
            strict_names: config.strict,
            ..Default::default()
        }
    }

    /// Set the public context
    pub fn with_public(mut self, public: PublicContext) -> Self {
        self.public = public;
        self
    }
}

/// State shared by the compilation of one task
pub struct CompilationContext<'a> {
    /// Host evaluator used for folding and rendering
    pub evaluator: &'a Evaluator,

    /// The public context as bindings
    pub public: &'a Bindings,

    /// Bindings placeholders are folded against (the public context, plus
    /// `item` and `index` inside an unrolled block)
    pub bindings: &'a Bindings,

    /// Names used in generated code
    pub naming: &'a NamingConfig,

    /// Built-ins the classifier may import
    pub registry: &'a Registry,

    /// Indentation of the task's body lines
    pub indent: usize,

    /// Position of the task in its list
    pub task_index: usize,

    /// Names bound at run time, when unbound names are checked
    pub runtime_names: Option<&'a HashSet<String>>,
}

impl<'a> CompilationContext<'a> {
    /// Partial evaluator over this context's bindings
    pub fn folder(&self) -> Folder<'_> {
        let folder = Folder::new(self.evaluator, self.bindings);
        match self.runtime_names {
            Some(names) => folder.strict(names),
            None => folder,
        }
    }

    /// The same context folding against other bindings
    pub fn with_bindings<'b>(&'b self, bindings: &'b Bindings) -> CompilationContext<'b> {
        CompilationContext {
            evaluator: self.evaluator,
            public: self.public,
            bindings,
            naming: self.naming,
            registry: self.registry,
            indent: self.indent,
            task_index: self.task_index,
            runtime_names: self.runtime_names,
        }
    }
}

/// Compiles task lists with fixed options
pub struct Compiler {
    options: CompileOptions,
    registry: Registry,
    evaluator: Evaluator,
}

impl Compiler {
    /// Create a compiler resolving built-ins against `registry`
    pub fn new(options: CompileOptions, registry: Registry) -> Self {
        Compiler {
            options,
            registry,
            evaluator: Evaluator::new(),
        }
    }

    /// Compile a task list into both payloads
    pub fn compile(&self, tasks: &[Task]) -> CompileResult<CompiledProgram> {
        let naming = &self.options.naming;
        let public = self.options.public.to_bindings();
        let indent = self.options.indent + 2;

        let mut runtime_names: HashSet<String> = [
            &naming.result,
            &naming.root,
            &naming.env,
            &naming.item,
            &naming.index,
        ]
        .into_iter()
        .cloned()
        .collect();

        let mut assembler = Assembler::new(naming.clone(), indent);
        for (task_index, task) in tasks.iter().enumerate() {
            let classified = {
                let ctx = self.context(&public, indent, task_index, &runtime_names);
                classify(task, &ctx)?
            };
            runtime_names.extend(classified.fragment.bound_names().map(str::to_string));

            let body = {
                let ctx = self.context(&public, indent, task_index, &runtime_names);
                match &task.r#loop {
                    Some(source) => loops::expand_loop(source, &classified, task, &ctx)?,
                    None => invoke::compile_invocation(&classified, task, &ctx)?,
                }
            };
            runtime_names.extend(body.bound_names().map(str::to_string));

            let fragment = classified.fragment.append(body);
            if !fragment.diagnostics.is_empty() {
                tracing::debug!("{}", fragment.diagnostics.trim_end());
            }
            tracing::trace!(
                "task {} compiled to:\n{}",
                task_index.to_string().cyan(),
                fragment.body
            );
            assembler.push(fragment);
        }

        let program = assembler.finish();
        tracing::debug!(
            "compiled {} task(s) into {} step(s)",
            tasks.len(),
            program.program.steps.len()
        );
        Ok(program)
    }

    fn context<'a>(
        &'a self,
        public: &'a Bindings,
        indent: usize,
        task_index: usize,
        runtime_names: &'a HashSet<String>,
    ) -> CompilationContext<'a> {
        CompilationContext {
            evaluator: &self.evaluator,
            public,
            bindings: public,
            naming: &self.options.naming,
            registry: &self.registry,
            indent,
            task_index,
            runtime_names: self.options.strict_names.then_some(runtime_names),
        }
    }
}

/// Compile a task list with the default built-ins
pub fn compile_tasks(tasks: &[Task], options: CompileOptions) -> CompileResult<CompiledProgram> {
    Compiler::new(options, Registry::with_defaults()).compile(tasks)
}
