//! Program interpreter
//!
//! Runs the structured form of a compiled program in a fresh Lua state. The
//! state carries the capability object (built-ins and the module importer)
//! under the configured name, so the runtime payload text sees the same
//! environment as the interpreted steps.

use crate::compiler::ir::{Import, ImportSource, Step};
use crate::compiler::literal::Literal;
use crate::compiler::template::Segment;
use crate::compiler::Program;
use crate::config::NamingConfig;
use crate::error::{EvalError, RuntimeError, RuntimeResult};
use crate::eval::{Evaluator, Scope};
use crate::runner::builtins::Registry;
use crate::runner::command;
use mlua::{Function, Lua, MultiValue, Table, Value};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Registry key of the loaded module cache
const MODULES_KEY: &str = "__ys_modules";

/// What a running program may use
#[derive(Debug, Clone)]
pub struct Capabilities {
    /// Built-in functions
    pub globals: Registry,

    /// Directory module paths and commands are resolved from
    pub base_dir: PathBuf,
}

impl Capabilities {
    /// Capabilities rooted at the current working directory
    pub fn new(globals: Registry) -> Self {
        Capabilities {
            globals,
            base_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }

    /// Resolve modules and run commands from `dir`
    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = dir.into();
        self
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::new(Registry::with_defaults())
    }
}

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Every step ran
    Completed,

    /// A command step ended the program with this exit code
    Exited(i32),
}

/// Run a compiled program once
pub fn run(program: &Program, capabilities: &Capabilities) -> RuntimeResult<Outcome> {
    let interpreter = Interpreter::new(&program.naming, capabilities)?;
    interpreter.run(program)
}

/// Set the capability object as the global `name`
///
/// The object holds `globals` (the built-in table) and `import(from)`, which
/// loads a Lua module relative to the base directory, once per path.
pub fn install_capabilities(lua: &Lua, capabilities: &Capabilities, name: &str) -> mlua::Result<Table> {
    let object = lua.create_table()?;
    object.set("globals", capabilities.globals.install(lua)?)?;

    lua.set_named_registry_value(MODULES_KEY, lua.create_table()?)?;
    let base_dir = capabilities.base_dir.clone();
    let import = lua.create_function(move |lua, from: String| import_module(lua, &base_dir, &from))?;
    object.set("import", import)?;

    lua.globals().set(name, object.clone())?;
    Ok(object)
}

fn import_module(lua: &Lua, base_dir: &Path, from: &str) -> mlua::Result<Value> {
    let cache: Table = lua.named_registry_value(MODULES_KEY)?;
    let cached: Value = cache.raw_get(from)?;
    if !cached.is_nil() {
        return Ok(cached);
    }

    let path = resolve_module(base_dir, from).ok_or_else(|| {
        mlua::Error::external(format!(
            "module '{}' not found in {}",
            from,
            base_dir.display()
        ))
    })?;
    let source = fs::read_to_string(&path)
        .map_err(|e| mlua::Error::external(format!("cannot read '{}': {}", path.display(), e)))?;

    tracing::debug!("loading module {}", path.display());
    let value: Value = lua
        .load(source)
        .set_name(format!("@{}", path.display()))
        .eval()?;
    // A module returning nothing is still loaded
    let value = if value.is_nil() {
        Value::Boolean(true)
    } else {
        value
    };
    cache.raw_set(from, value.clone())?;
    Ok(value)
}

fn resolve_module(base_dir: &Path, from: &str) -> Option<PathBuf> {
    let path = base_dir.join(from);
    if path.is_file() {
        return Some(path);
    }
    let path = base_dir.join(format!("{}.lua", from));
    path.is_file().then_some(path)
}

struct Interpreter<'a> {
    evaluator: Evaluator,
    naming: &'a NamingConfig,
    capabilities: &'a Capabilities,
    object: Table,
}

impl<'a> Interpreter<'a> {
    fn new(naming: &'a NamingConfig, capabilities: &'a Capabilities) -> RuntimeResult<Self> {
        let evaluator = Evaluator::new();
        let object = install_capabilities(evaluator.lua(), capabilities, &naming.capabilities)?;
        Ok(Interpreter {
            evaluator,
            naming,
            capabilities,
            object,
        })
    }

    fn run(&self, program: &Program) -> RuntimeResult<Outcome> {
        let lua = self.evaluator.lua();
        let scope = self.evaluator.root_scope()?;
        scope.declare(&self.naming.result, Value::Nil)?;
        scope.declare(&self.naming.root, Value::Nil)?;
        scope.declare(&self.naming.env, Value::Table(lua.create_table()?))?;

        for import in &program.imports {
            let value = self.resolve_import(import)?;
            scope.declare(&import.binding, value)?;
        }

        tracing::debug!("running {} step(s)", program.steps.len());
        match self.exec_steps(&program.steps, &scope)? {
            Some(code) => Ok(Outcome::Exited(code)),
            None => Ok(Outcome::Completed),
        }
    }

    fn resolve_import(&self, import: &Import) -> RuntimeResult<Value> {
        match &import.source {
            ImportSource::Module { from, export } => {
                let import_error = |error: String| RuntimeError::Import {
                    from: from.clone(),
                    error,
                };
                let module = import_module(self.evaluator.lua(), &self.capabilities.base_dir, from)
                    .map_err(|e| import_error(e.to_string()))?;
                let Some(field) = export else {
                    return Ok(module);
                };
                let module = match module {
                    Value::Table(module) => module,
                    other => {
                        return Err(import_error(format!(
                            "module returned a {}, not a table",
                            other.type_name()
                        )))
                    }
                };
                match module.get::<Value>(field.as_str())? {
                    Value::Nil => Err(import_error(format!("no export named '{}'", field))),
                    value => Ok(value),
                }
            }
            ImportSource::Builtin { name } => {
                let globals: Table = self.object.get("globals")?;
                Ok(globals.get::<Value>(name.as_str())?)
            }
        }
    }

    fn exec_steps(&self, steps: &[Step], scope: &Scope) -> RuntimeResult<Option<i32>> {
        for step in steps {
            if let Some(code) = self.exec(step, scope)? {
                return Ok(Some(code));
            }
        }
        Ok(None)
    }

    /// Run one step; `Some(code)` ends the program
    fn exec(&self, step: &Step, scope: &Scope) -> RuntimeResult<Option<i32>> {
        match step {
            Step::Declare { name, value } => {
                let value = self.value(value, scope)?;
                scope.declare(name, value)?;
            }
            Step::Call { target, args } => {
                let func = self.callable(target, scope)?;
                let args = args
                    .iter()
                    .map(|arg| self.value(arg, scope))
                    .collect::<RuntimeResult<Vec<_>>>()?;
                let value = func.call::<Value>(MultiValue::from_vec(args))?;
                scope.assign(&self.naming.result, value)?;
            }
            Step::Command { program, args } => {
                let args = args
                    .iter()
                    .map(|arg| {
                        let value = self.value(arg, scope)?;
                        Ok(self.evaluator.display(value)?)
                    })
                    .collect::<RuntimeResult<Vec<String>>>()?;
                let code = command::execute_command(program, &args, &self.capabilities.base_dir)?;
                return Ok(Some(code));
            }
            Step::Loop { source, body } => {
                let items = match self.value(source, scope)? {
                    Value::Table(items) => items,
                    other => return Err(RuntimeError::InvalidLoopSource(other.type_name().to_string())),
                };
                for index in 0..items.raw_len() {
                    let inner = self.evaluator.child_scope(scope)?;
                    inner.declare(&self.naming.item, items.raw_get::<Value>(index + 1)?)?;
                    inner.declare(&self.naming.index, Value::Integer(index as i64))?;
                    if let Some(code) = self.exec_steps(body, &inner)? {
                        return Ok(Some(code));
                    }
                }
            }
            Step::Block { body } => {
                let inner = self.evaluator.child_scope(scope)?;
                return self.exec_steps(body, &inner);
            }
        }
        Ok(None)
    }

    /// Resolve a plain or dotted call target to a function
    fn callable(&self, target: &str, scope: &Scope) -> RuntimeResult<Function> {
        let not_callable = || RuntimeError::NotCallable(target.to_string());

        let mut segments = target.split('.');
        let first = segments.next().unwrap_or(target);
        let mut value = match scope.get(first) {
            Ok(value) => value,
            Err(EvalError::Unbound(_)) => return Err(not_callable()),
            Err(err) => return Err(err.into()),
        };
        for segment in segments {
            value = match value {
                Value::Table(table) => table.get::<Value>(segment)?,
                _ => return Err(not_callable()),
            };
        }
        match value {
            Value::Function(func) => Ok(func),
            _ => Err(not_callable()),
        }
    }

    /// Evaluate a literal in the current scope
    fn value(&self, literal: &Literal, scope: &Scope) -> RuntimeResult<Value> {
        let lua = self.evaluator.lua();
        Ok(match literal {
            Literal::Const(value) => self.evaluator.to_lua(value)?,
            Literal::Expr(expr) => self.evaluator.eval_in(expr, scope)?,
            Literal::Deferred(segments) => {
                let mut text = String::new();
                for segment in segments {
                    match segment {
                        Segment::Text(part) => text.push_str(part),
                        Segment::Expr(expr) => {
                            let value = self.evaluator.eval_in(expr, scope)?;
                            text.push_str(&self.evaluator.display(value)?);
                        }
                    }
                }
                Value::String(lua.create_string(text)?)
            }
            Literal::Seq(items) => {
                let table = lua.create_table()?;
                for (i, item) in items.iter().enumerate() {
                    table.raw_set(i + 1, self.value(item, scope)?)?;
                }
                Value::Table(table)
            }
            Literal::Map(entries) => {
                let table = lua.create_table()?;
                for (key, item) in entries {
                    table.raw_set(key.as_str(), self.value(item, scope)?)?;
                }
                Value::Table(table)
            }
        })
    }
}
