//! Host expression evaluator
//!
//! Placeholder expressions are Lua expressions. Names resolve through a chain
//! of scopes and finally the Lua globals; a name found nowhere raises
//! [`EvalError::Unbound`], which callers use to tell "not known yet" apart
//! from a real failure.

use crate::error::{EvalError, EvalResult};
use mlua::{DeserializeOptions, Function, Lua, LuaSerdeExt, SerializeOptions, Table, Value};
use serde_json::Value as JsonValue;
use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

/// Named values visible to an expression
pub type Bindings = serde_json::Map<String, JsonValue>;

/// Raised from the scope lookup hook when a name is bound nowhere
#[derive(Debug)]
struct UnboundName(String);

impl fmt::Display for UnboundName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}' is not defined", self.0)
    }
}

impl std::error::Error for UnboundName {}

/// One level of name bindings backed by a Lua table
///
/// Declared names resolve to their value even when it is `nil`; anything else
/// falls through to the parent scope and, at the root, to the Lua globals.
#[derive(Clone)]
pub struct Scope {
    table: Table,
    declared: Rc<RefCell<HashSet<String>>>,
    parent: Option<Box<Scope>>,
}

impl Scope {
    /// Bind a new name in this scope
    pub fn declare(&self, name: &str, value: Value) -> EvalResult<()> {
        self.declared.borrow_mut().insert(name.to_string());
        self.table.raw_set(name, value)?;
        Ok(())
    }

    /// Update the nearest binding of `name`, declaring it at the root when
    /// no scope has it
    pub fn assign(&self, name: &str, value: Value) -> EvalResult<()> {
        if self.declares(name) {
            self.table.raw_set(name, value)?;
            return Ok(());
        }
        match &self.parent {
            Some(parent) => parent.assign(name, value),
            None => self.declare(name, value),
        }
    }

    /// Look a name up through the scope chain
    pub fn get(&self, name: &str) -> EvalResult<Value> {
        self.table.get::<Value>(name).map_err(lift)
    }

    /// Whether the name was declared directly in this scope
    pub fn declares(&self, name: &str) -> bool {
        self.declared.borrow().contains(name)
    }

    /// Lua environment table for this scope
    pub fn table(&self) -> &Table {
        &self.table
    }
}

/// Embedded Lua state used to evaluate placeholder expressions
pub struct Evaluator {
    lua: Lua,
}

impl Evaluator {
    /// Create an evaluator with the standard Lua libraries loaded
    pub fn new() -> Self {
        Evaluator { lua: Lua::new() }
    }

    /// The underlying Lua state
    pub fn lua(&self) -> &Lua {
        &self.lua
    }

    /// Create a scope whose misses fall through to the Lua globals
    pub fn root_scope(&self) -> EvalResult<Scope> {
        self.scope(None)
    }

    /// Create a nested scope
    pub fn child_scope(&self, parent: &Scope) -> EvalResult<Scope> {
        self.scope(Some(parent.clone()))
    }

    /// Create a root scope holding every binding
    pub fn scope_from(&self, bindings: &Bindings) -> EvalResult<Scope> {
        let scope = self.root_scope()?;
        for (name, value) in bindings {
            scope.declare(name, self.to_lua(value)?)?;
        }
        Ok(scope)
    }

    fn scope(&self, parent: Option<Scope>) -> EvalResult<Scope> {
        let declared: Rc<RefCell<HashSet<String>>> = Rc::default();
        let outer = parent.as_ref().map(|scope| scope.table.clone());
        let table = self.lua.create_table()?;
        let meta = self.lua.create_table()?;

        let names = declared.clone();
        let index = self
            .lua
            .create_function(move |lua, (_, key): (Table, Value)| {
                let name = match key {
                    Value::String(s) => s.to_string_lossy(),
                    _ => return Ok(Value::Nil),
                };
                if names.borrow().contains(&name) {
                    return Ok(Value::Nil);
                }
                match &outer {
                    Some(outer) => outer.get::<Value>(name),
                    None => {
                        let global = lua.globals().get::<Value>(name.as_str())?;
                        if global.is_nil() {
                            Err(mlua::Error::external(UnboundName(name)))
                        } else {
                            Ok(global)
                        }
                    }
                }
            })?;
        meta.set("__index", index)?;
        table.set_metatable(Some(meta))?;

        Ok(Scope {
            table,
            declared,
            parent: parent.map(Box::new),
        })
    }

    /// Evaluate one expression inside a scope
    pub fn eval_in(&self, expr: &str, scope: &Scope) -> EvalResult<Value> {
        self.lua
            .load(format!("return {}", expr))
            .set_name(format!("=${{{}}}", expr))
            .set_environment(scope.table.clone())
            .eval::<Value>()
            .map_err(lift)
    }

    /// Evaluate one expression against plain bindings
    pub fn evaluate(&self, expr: &str, bindings: &Bindings) -> EvalResult<JsonValue> {
        let scope = self.scope_from(bindings)?;
        let value = self.eval_in(expr, &scope)?;
        self.to_json(value)
    }

    /// Convert a structured value into a Lua value (`null` becomes `nil`)
    pub fn to_lua(&self, value: &JsonValue) -> EvalResult<Value> {
        let options = SerializeOptions::new()
            .serialize_none_to_null(false)
            .serialize_unit_to_null(false);
        Ok(self.lua.to_value_with(value, options)?)
    }

    /// Convert a Lua value into a structured value
    pub fn to_json(&self, value: Value) -> EvalResult<JsonValue> {
        let options = DeserializeOptions::new().deny_unsupported_types(false);
        Ok(self.lua.from_value_with(value, options)?)
    }

    /// String form of a value, as Lua's `tostring` gives it
    pub fn display(&self, value: Value) -> EvalResult<String> {
        if let Value::String(s) = &value {
            return Ok(s.to_string_lossy());
        }
        let tostring: Function = self.lua.globals().get("tostring")?;
        Ok(tostring.call::<String>(value)?)
    }

    /// Whether a plain or dotted name is a function among the Lua globals
    pub fn is_global_function(&self, path: &str) -> bool {
        let mut segments = path.split('.');
        let Some(first) = segments.next() else {
            return false;
        };
        let mut value = match self.lua.globals().get::<Value>(first) {
            Ok(value) => value,
            Err(_) => return false,
        };
        for segment in segments {
            value = match value {
                Value::Table(table) => table.get::<Value>(segment).unwrap_or(Value::Nil),
                _ => return false,
            };
        }
        matches!(value, Value::Function(_))
    }
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new()
    }
}

/// String form of a folded value: strings verbatim, everything else as JSON
pub fn stringify(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn lift(err: mlua::Error) -> EvalError {
    match unbound_name(&err) {
        Some(name) => EvalError::Unbound(name),
        None => EvalError::Lua(err),
    }
}

fn unbound_name(err: &mlua::Error) -> Option<String> {
    match err {
        mlua::Error::CallbackError { cause, .. } => unbound_name(cause),
        mlua::Error::WithContext { cause, .. } => unbound_name(cause),
        mlua::Error::ExternalError(inner) => {
            inner.downcast_ref::<UnboundName>().map(|u| u.0.clone())
        }
        _ => None,
    }
}
