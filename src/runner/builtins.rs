//! Built-in function registry
//!
//! Built-ins are host callables registered under plain or dotted names
//! (`sleep`, `json.stringify`). The compiler only asks whether a name is
//! registered; the interpreter installs them as a nested Lua table.

use mlua::{DeserializeOptions, Lua, LuaSerdeExt, MultiValue, Table, Value};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// A registered callable
pub type Builtin = Arc<dyn Fn(&Lua, MultiValue) -> mlua::Result<Value> + Send + Sync>;

/// Named host callables
#[derive(Clone, Default)]
pub struct Registry {
    entries: BTreeMap<String, Builtin>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.entries.keys()).finish()
    }
}

impl Registry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the default built-ins
    pub fn with_defaults() -> Self {
        let mut registry = Registry::new();
        registry.register("json.stringify", json_stringify);
        registry.register("json.parse", json_parse);
        registry.register("fs.read", fs_read);
        registry.register("fs.write", fs_write);
        registry.register("sleep", sleep);
        registry
    }

    /// Register `func` under a plain or dotted name, replacing any previous entry
    pub fn register<F>(&mut self, name: impl Into<String>, func: F)
    where
        F: Fn(&Lua, MultiValue) -> mlua::Result<Value> + Send + Sync + 'static,
    {
        self.entries.insert(name.into(), Arc::new(func));
    }

    /// Whether `path` names a built-in or a namespace of built-ins
    pub fn contains(&self, path: &str) -> bool {
        if path.is_empty() {
            return false;
        }
        let prefix = format!("{}.", path);
        self.entries
            .keys()
            .any(|name| name == path || name.starts_with(&prefix))
    }

    /// Build the table of built-ins, nesting dotted names
    pub fn install(&self, lua: &Lua) -> mlua::Result<Table> {
        let root = lua.create_table()?;
        for (name, func) in &self.entries {
            let mut segments: Vec<&str> = name.split('.').collect();
            let Some(last) = segments.pop() else {
                continue;
            };

            let mut table = root.clone();
            for segment in segments {
                table = match table.raw_get::<Value>(segment)? {
                    Value::Table(inner) => inner,
                    Value::Nil => {
                        let inner = lua.create_table()?;
                        table.raw_set(segment, inner.clone())?;
                        inner
                    }
                    _ => {
                        return Err(mlua::Error::runtime(format!(
                            "built-in '{}' is nested under a function",
                            name
                        )))
                    }
                };
            }

            let func = func.clone();
            table.raw_set(
                last,
                lua.create_function(move |lua, args: MultiValue| func(lua, args))?,
            )?;
        }
        Ok(root)
    }
}

fn json_stringify(lua: &Lua, args: MultiValue) -> mlua::Result<Value> {
    let value = args.into_iter().next().unwrap_or(Value::Nil);
    let options = DeserializeOptions::new().deny_unsupported_types(false);
    let json: JsonValue = lua.from_value_with(value, options)?;
    let text = serde_json::to_string(&json).map_err(mlua::Error::external)?;
    Ok(Value::String(lua.create_string(text)?))
}

fn json_parse(lua: &Lua, args: MultiValue) -> mlua::Result<Value> {
    let text: String = lua.unpack_multi(args)?;
    let json: JsonValue = serde_json::from_str(&text).map_err(mlua::Error::external)?;
    lua.to_value(&json)
}

fn fs_read(lua: &Lua, args: MultiValue) -> mlua::Result<Value> {
    let path: String = lua.unpack_multi(args)?;
    let contents = fs::read_to_string(&path)
        .map_err(|e| mlua::Error::external(format!("cannot read '{}': {}", path, e)))?;
    Ok(Value::String(lua.create_string(contents)?))
}

fn fs_write(lua: &Lua, args: MultiValue) -> mlua::Result<Value> {
    let (path, contents): (String, mlua::String) = lua.unpack_multi(args)?;
    fs::write(&path, contents.as_bytes().to_vec())
        .map_err(|e| mlua::Error::external(format!("cannot write '{}': {}", path, e)))?;
    Ok(Value::Nil)
}

fn sleep(lua: &Lua, args: MultiValue) -> mlua::Result<Value> {
    let millis: u64 = lua.unpack_multi(args)?;
    thread::sleep(Duration::from_millis(millis));
    Ok(Value::Nil)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_contains() {
        let registry = Registry::with_defaults();
        assert!(registry.contains("json"));
        assert!(registry.contains("json.stringify"));
        assert!(registry.contains("sleep"));
        assert!(!registry.contains("js"));
        assert!(!registry.contains("json.missing"));
        assert!(!registry.contains(""));
    }

    #[test]
    fn test_register_custom() {
        let mut registry = Registry::new();
        registry.register("math2.double", |lua, args| {
            let n: i64 = lua.unpack_multi(args)?;
            Ok(Value::Integer(n * 2))
        });
        assert!(registry.contains("math2"));

        let lua = Lua::new();
        lua.globals()
            .set("globals", registry.install(&lua).unwrap())
            .unwrap();
        let doubled: i64 = lua.load("return globals.math2.double(21)").eval().unwrap();
        assert_eq!(doubled, 42);
    }

    #[test]
    fn test_json_builtins() {
        let lua = Lua::new();
        lua.globals()
            .set("g", Registry::with_defaults().install(&lua).unwrap())
            .unwrap();
        let text: String = lua
            .load(r#"return g.json.stringify({name = "ys"})"#)
            .eval()
            .unwrap();
        assert_eq!(text, r#"{"name":"ys"}"#);

        let name: String = lua
            .load(r#"return g.json.parse('{"name": "ys"}').name"#)
            .eval()
            .unwrap();
        assert_eq!(name, "ys");
    }

    #[test]
    fn test_fs_builtins() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("out.txt");

        let lua = Lua::new();
        lua.globals()
            .set("g", Registry::with_defaults().install(&lua).unwrap())
            .unwrap();
        lua.globals()
            .set("path", path.to_string_lossy().to_string())
            .unwrap();
        lua.load(r#"g.fs.write(path, "hello")"#).exec().unwrap();
        let contents: String = lua.load("return g.fs.read(path)").eval().unwrap();
        assert_eq!(contents, "hello");
    }

    #[test]
    fn test_builtin_argument_checks() {
        let lua = Lua::new();
        lua.globals()
            .set("g", Registry::with_defaults().install(&lua).unwrap())
            .unwrap();
        lua.load("g.sleep(1)").exec().unwrap();
        assert!(lua.load("g.sleep('soon')").exec().is_err());
        assert!(lua.load("g.fs.write('only-a-path')").exec().is_err());
        assert!(lua.load("g.json.parse('{')").exec().is_err());
    }

    #[test]
    fn test_conflicting_names() {
        let mut registry = Registry::new();
        registry.register("a", |_, _| Ok(Value::Nil));
        registry.register("a.b", |_, _| Ok(Value::Nil));
        assert!(registry.install(&Lua::new()).is_err());
    }
}
