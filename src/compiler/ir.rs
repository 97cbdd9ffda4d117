//! Compiled program representation
//!
//! Tasks compile to a list of [`Step`]s plus a dependency table of
//! [`Import`]s. The interpreter runs the steps directly; [`render_steps`]
//! emits the same steps as Lua source for the persisted artifacts.

use crate::compiler::literal::Literal;
use crate::compiler::template::quote;
use crate::config::NamingConfig;

/// One executable instruction
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// Bind a new name in the current scope
    Declare { name: String, value: Literal },

    /// Call `target` and store the value in the result binding
    Call { target: String, args: Vec<Literal> },

    /// Spawn an external program and end the run with its exit code
    Command { program: String, args: Vec<Literal> },

    /// Run `body` once per element of a sequence known only at run time
    Loop { source: Literal, body: Vec<Step> },

    /// Run `body` in a nested scope
    Block { body: Vec<Step> },
}

/// A name bound before the body runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Import {
    /// Local name of the binding
    pub binding: String,

    /// Where the value comes from
    pub source: ImportSource,
}

/// Resolution kind of an import
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportSource {
    /// A user module; `export` picks a field of the module value, `None`
    /// binds the module value itself
    Module {
        from: String,
        export: Option<String>,
    },

    /// A root entry of the built-in registry
    Builtin { name: String },
}

impl Import {
    /// Lua statement binding this import in the module payload
    pub fn module_source(&self, naming: &NamingConfig) -> String {
        match &self.source {
            ImportSource::Module { from, export } => {
                require_line(&self.binding, &format!("{}({})", MODULE_LOADER, quote(from)), export)
            }
            ImportSource::Builtin { name } => require_line(
                &self.binding,
                &format!("require({})", quote(&naming.builtin_package)),
                &Some(name.clone()),
            ),
        }
    }

    /// Lua statement binding this import in the runtime payload
    pub fn runtime_source(&self, naming: &NamingConfig) -> String {
        match &self.source {
            ImportSource::Module { from, export } => require_line(
                &self.binding,
                &format!("{}.import({})", naming.capabilities, quote(from)),
                export,
            ),
            ImportSource::Builtin { name } => require_line(
                &self.binding,
                &format!("{}.globals", naming.capabilities),
                &Some(name.clone()),
            ),
        }
    }
}

/// Name of the file loader defined by module payloads that import modules
pub const MODULE_LOADER: &str = "__ys_import";

/// Lua source defining [`MODULE_LOADER`]
///
/// Paths resolve against the directory of the loading file, falling back to
/// `<from>.lua`. Loaded values are cached in `package.loaded`; a module
/// returning nothing is cached as `true`.
pub const MODULE_LOADER_SOURCE: &str = r#"local __ys_import
do
  local info = debug and debug.getinfo(1, "S")
  local base = info and info.source:match("^@(.-)[^/\\]*$") or ""
  function __ys_import(from)
    local key = from:sub(1, 1) == "/" and from or base .. from
    local loaded = package.loaded[key]
    if loaded ~= nil then
      return loaded
    end
    local chunk, err = loadfile(key)
    if not chunk then
      chunk = loadfile(key .. ".lua")
    end
    if not chunk then
      error(err, 2)
    end
    local value = chunk()
    if value == nil then
      value = true
    end
    package.loaded[key] = value
    return value
  end
end
"#;

fn require_line(binding: &str, module: &str, export: &Option<String>) -> String {
    match export {
        Some(field) => format!("local {} = {}.{}\n", binding, module, field),
        None => format!("local {} = {}\n", binding, module),
    }
}

/// Lua source of `steps`, each line indented by `indent` spaces
pub fn render_steps(steps: &[Step], naming: &NamingConfig, indent: usize) -> String {
    let mut out = String::new();
    for step in steps {
        render_step(step, naming, indent, &mut out);
    }
    out
}

fn render_step(step: &Step, naming: &NamingConfig, indent: usize, out: &mut String) {
    let pad = " ".repeat(indent);
    match step {
        Step::Declare { name, value } => {
            out.push_str(&format!("{}local {} = {}\n", pad, name, value.to_source()));
        }
        Step::Call { target, args } => {
            out.push_str(&format!(
                "{}{} = {}({})\n",
                pad,
                naming.result,
                target,
                args_source(args)
            ));
        }
        Step::Command { program, args } => {
            let mut argv = vec![quote(program)];
            argv.extend(args.iter().map(Literal::to_source));
            out.push_str(&indent_lines(
                &command_source(&format!("{{{}}}", argv.join(", "))),
                indent,
            ));
        }
        Step::Loop { source, body } => {
            out.push_str(&format!("{}do\n", pad));
            out.push_str(&format!("{}  local __items = {}\n", pad, source.to_source()));
            out.push_str(&format!(
                "{}  for {} = 0, #__items - 1 do\n",
                pad, naming.index
            ));
            out.push_str(&format!(
                "{}    local {} = __items[{} + 1]\n",
                pad, naming.item, naming.index
            ));
            render_block_body(body, naming, indent + 4, out);
            out.push_str(&format!("{}  end\n", pad));
            out.push_str(&format!("{}end\n", pad));
        }
        Step::Block { body } => {
            out.push_str(&format!("{}do\n", pad));
            render_block_body(body, naming, indent + 2, out);
            out.push_str(&format!("{}end\n", pad));
        }
    }
}

fn render_block_body(body: &[Step], naming: &NamingConfig, indent: usize, out: &mut String) {
    for step in body {
        render_step(step, naming, indent, out);
    }
}

fn args_source(args: &[Literal]) -> String {
    args.iter()
        .map(Literal::to_source)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Spawn `argv`, relay the captured output and exit with the child's code
///
/// Every argument is single-quoted for `sh`, so the program sees it verbatim.
/// A child killed by a signal reports 1.
fn command_source(argv: &str) -> String {
    format!(
        r#"do
  local argv = {argv}
  local function shell_quote(arg)
    return "'" .. (tostring(arg):gsub("'", "'\\''")) .. "'"
  end
  local quoted = {{}}
  for i, arg in ipairs(argv) do
    quoted[i] = shell_quote(arg)
  end
  local errfile = os.tmpname()
  local proc = io.popen(table.concat(quoted, " ") .. " 2>" .. shell_quote(errfile))
  if not proc then
    os.remove(errfile)
    io.stderr:write("failed to spawn " .. tostring(argv[1]) .. "\n")
    os.exit(1)
  end
  local output = proc:read("a") or ""
  local _, how, code = proc:close()
  if how ~= "exit" or code == nil then
    code = 1
  end
  if code == 0 then
    io.stdout:write(output)
  else
    local errors = io.open(errfile)
    if errors then
      io.stderr:write(errors:read("a"))
      errors:close()
    end
  end
  os.remove(errfile)
  os.exit(code)
end
"#
    )
}

/// Indent every non-blank line of `code` by `indent` spaces
pub fn indent_lines(code: &str, indent: usize) -> String {
    if indent == 0 {
        return code.to_string();
    }
    let pad = " ".repeat(indent);
    code.split('\n')
        .map(|line| {
            if line.trim().is_empty() {
                line.to_string()
            } else {
                format!("{}{}", pad, line)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}
