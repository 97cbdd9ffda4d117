//! Integration tests for running compiled programs

mod common;

use common::write_file;
use mlua::{Function, Lua, Value};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use ys::compiler::{compile_tasks, CompileOptions, Compiler};
use ys::config::parse_tasks;
use ys::context::PublicContext;
use ys::dist::write_artifacts;
use ys::error::RuntimeError;
use ys::runner::{run, Capabilities, Outcome, Registry};

/// Default built-ins plus `log`, which collects its first argument as text
fn logging_registry() -> (Registry, Arc<Mutex<Vec<String>>>) {
    let lines: Arc<Mutex<Vec<String>>> = Arc::default();
    let sink = lines.clone();
    let mut registry = Registry::with_defaults();
    registry.register("log", move |lua, args| {
        let line: String = lua.unpack_multi(args)?;
        sink.lock().unwrap().push(line);
        Ok(Value::Nil)
    });
    (registry, lines)
}

fn run_in(dir: &Path, yaml: &str) -> (Result<Outcome, RuntimeError>, Vec<String>) {
    let (registry, lines) = logging_registry();
    let options =
        CompileOptions::default().with_public(PublicContext::new().with_env("STAGE", "test"));
    let tasks = parse_tasks(yaml).unwrap();
    let program = Compiler::new(options, registry.clone())
        .compile(&tasks)
        .unwrap();

    let capabilities = Capabilities::new(registry).with_base_dir(dir);
    let outcome = run(&program.program, &capabilities);
    let lines = lines.lock().unwrap().clone();
    (outcome, lines)
}

#[test]
fn test_pipeline_through_module_and_builtins() {
    let temp_dir = TempDir::new().unwrap();
    write_file(
        temp_dir.path(),
        "lib/names.lua",
        r#"
local names = {}
function names.list(prefix)
  return { prefix .. "-a", prefix .. "-b" }
end
return { names = names }
"#,
    );

    let yaml = r#"
- from: ./lib/names.lua
  use: names.list
  args: ${build.env.STAGE}
- use: log
  loop: ${result}
  args: "${index}: ${item}"
"#;
    let (outcome, lines) = run_in(temp_dir.path(), yaml);
    assert_eq!(outcome.unwrap(), Outcome::Completed);
    assert_eq!(lines, vec!["0: test-a", "1: test-b"]);
}

#[test]
fn test_json_round_trip_through_fs() {
    let temp_dir = TempDir::new().unwrap();
    let out = temp_dir.path().join("out.json");
    let yaml = format!(
        r#"
- use: json.stringify
  args:
    - name: ys
      tags: [a, b]
- use: fs.write
  args: ["{path}", "${{result}}"]
- use: fs.read
  args: "{path}"
- use: json.parse
  args: "${{result}}"
- use: log
  args: "${{result.name}} ${{#result.tags}}"
"#,
        path = out.display()
    );
    let (outcome, lines) = run_in(temp_dir.path(), &yaml);
    assert_eq!(outcome.unwrap(), Outcome::Completed);
    assert_eq!(lines, vec!["ys 2"]);
}

#[test]
fn test_set_vars_are_visible_to_later_tasks() {
    let temp_dir = TempDir::new().unwrap();
    let yaml = r#"
- use: setVars
  args:
    greeting: hello
    count: 3
- use: log
  args: "${greeting} x${count + 1}"
"#;
    let (_, lines) = run_in(temp_dir.path(), yaml);
    assert_eq!(lines, vec!["hello x4"]);
}

#[test]
fn test_unrolled_loop_with_mapping_items() {
    let temp_dir = TempDir::new().unwrap();
    let yaml = r#"
- use: log
  loop:
    - { name: a, size: 1 }
    - { name: b, size: 2 }
  args: "${item.name}=${item.size * 10}"
"#;
    let (_, lines) = run_in(temp_dir.path(), yaml);
    assert_eq!(lines, vec!["a=10", "b=20"]);
}

#[test]
fn test_command_exit_code_stops_program() {
    let temp_dir = TempDir::new().unwrap();
    let yaml = r#"
- use: log
  args: before
- use: ":sh"
  args: ["-c", "exit 7"]
- use: log
  args: after
"#;
    let (outcome, lines) = run_in(temp_dir.path(), yaml);
    assert_eq!(outcome.unwrap(), Outcome::Exited(7));
    assert_eq!(lines, vec!["before"]);
}

#[test]
fn test_non_callable_target() {
    let temp_dir = TempDir::new().unwrap();
    write_file(temp_dir.path(), "lib.lua", "return { value = 1 }");
    let (outcome, _) = run_in(temp_dir.path(), "- from: ./lib.lua\n  use: value\n");
    assert!(matches!(outcome, Err(RuntimeError::NotCallable(ref name)) if name == "value"));
}

#[test]
fn test_lua_error_in_callee() {
    let temp_dir = TempDir::new().unwrap();
    write_file(
        temp_dir.path(),
        "lib.lua",
        "return { boom = function() error('kaboom') end }",
    );
    let (outcome, _) = run_in(temp_dir.path(), "- from: ./lib.lua\n  use: boom\n");
    let err = outcome.unwrap_err();
    assert!(err.to_string().contains("kaboom"));
}

#[test]
fn test_built_module_loads_file_modules() {
    let temp_dir = TempDir::new().unwrap();
    let dist = temp_dir.path().join("dist");
    write_file(
        &dist,
        "lib/names.lua",
        "return { mark = function(value) marked = value end }",
    );
    write_file(&dist, "helpers.lua", "return function(value) helped = value end");

    let yaml = r#"
- from: ./lib/names.lua
  use: mark
  args: hello
- from: ./helpers
  args: [2]
- from: ./lib/names.lua
  use: mark
  args: again
"#;
    let tasks = parse_tasks(yaml).unwrap();
    let program = compile_tasks(&tasks, CompileOptions::default()).unwrap();
    let written = write_artifacts(&program, Path::new("main.ys.yml"), &dist, false).unwrap();
    assert_eq!(written, vec![dist.join("main.lua")]);

    // module payloads find their own directory through `debug`
    let lua = unsafe { Lua::unsafe_new() };
    lua.globals()
        .set("path", written[0].to_str().unwrap())
        .unwrap();
    let main: Function = lua.load("return dofile(path)").eval().unwrap();
    main.call::<()>(()).unwrap();

    let marked: String = lua.globals().get("marked").unwrap();
    let helped: i64 = lua.globals().get("helped").unwrap();
    assert_eq!(marked, "again");
    assert_eq!(helped, 2);
}

#[test]
fn test_built_module_reports_missing_file() {
    let temp_dir = TempDir::new().unwrap();
    let tasks = parse_tasks("- from: ./missing.lua\n  use: f\n").unwrap();
    let program = compile_tasks(&tasks, CompileOptions::default()).unwrap();
    let written =
        write_artifacts(&program, Path::new("main.ys.yml"), temp_dir.path(), false).unwrap();

    let lua = unsafe { Lua::unsafe_new() };
    lua.globals()
        .set("path", written[0].to_str().unwrap())
        .unwrap();
    let err = lua.load("return dofile(path)").eval::<Function>().unwrap_err();
    assert!(err.to_string().contains("missing.lua"));
}
