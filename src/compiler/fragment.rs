//! Code fragments and program assembly
//!
//! Every compiled task yields a [`CodeFragment`]. Fragments are only ever
//! appended, in task order; the [`Assembler`] wraps the accumulated sections
//! into the two payloads of a [`CompiledProgram`].

use crate::compiler::ir::{self, Import, ImportSource, Step};
use crate::config::NamingConfig;

/// Compiled output of one or more tasks
///
/// Missing sections default to empty. [`CodeFragment::append`] is the only
/// way to combine fragments and is associative.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CodeFragment {
    /// Import lines of the module payload
    pub module_imports: String,

    /// Import lines of the runtime payload
    pub runtime_imports: String,

    /// Shared body text
    pub body: String,

    /// Human-readable notes about what was compiled
    pub diagnostics: String,

    /// Structured imports, run before the body
    pub imports: Vec<Import>,

    /// Structured body
    pub steps: Vec<Step>,
}

impl CodeFragment {
    /// An empty fragment
    pub fn new() -> Self {
        Self::default()
    }

    /// A fragment binding one import
    pub fn import(import: Import, naming: &NamingConfig) -> Self {
        CodeFragment {
            module_imports: import.module_source(naming),
            runtime_imports: import.runtime_source(naming),
            imports: vec![import],
            ..Default::default()
        }
    }

    /// A fragment holding body steps rendered at `indent`
    pub fn body(steps: Vec<Step>, naming: &NamingConfig, indent: usize) -> Self {
        CodeFragment {
            body: ir::render_steps(&steps, naming, indent),
            steps,
            ..Default::default()
        }
    }

    /// A fragment carrying a single diagnostic line
    pub fn diagnostic(line: impl Into<String>) -> Self {
        let mut diagnostics = line.into();
        if !diagnostics.ends_with('\n') {
            diagnostics.push('\n');
        }
        CodeFragment {
            diagnostics,
            ..Default::default()
        }
    }

    /// Concatenate `other` after this fragment, section by section
    pub fn append(mut self, other: CodeFragment) -> Self {
        self.module_imports.push_str(&other.module_imports);
        self.runtime_imports.push_str(&other.runtime_imports);
        self.body.push_str(&other.body);
        self.diagnostics.push_str(&other.diagnostics);
        self.imports.extend(other.imports);
        self.steps.extend(other.steps);
        self
    }

    /// Names this fragment binds for the tasks after it
    ///
    /// Only import bindings and top-level declarations count; blocks and loops
    /// scope their own names.
    pub fn bound_names(&self) -> impl Iterator<Item = &str> {
        let imported = self.imports.iter().map(|import| import.binding.as_str());
        let declared = self.steps.iter().filter_map(|step| match step {
            Step::Declare { name, .. } => Some(name.as_str()),
            _ => None,
        });
        imported.chain(declared)
    }
}

/// Structured form of a compiled program, run by the interpreter
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    /// Bindings resolved before the body runs
    pub imports: Vec<Import>,

    /// Body steps, in task order
    pub steps: Vec<Step>,

    /// Names the program was compiled with
    pub naming: NamingConfig,
}

/// Both payloads of a compiled task list, plus its structured form
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledProgram {
    /// Persistable module source returning its `main` function
    pub module_payload: String,

    /// Immediately runnable source, expecting the capability object in scope
    pub runtime_payload: String,

    /// Structured program
    pub program: Program,

    /// Accumulated diagnostics
    pub diagnostics: String,
}

/// Accumulates fragments in task order
pub struct Assembler {
    naming: NamingConfig,
    fragment: CodeFragment,
}

impl Assembler {
    /// Start a program whose body lines are indented by `indent`
    ///
    /// The body is seeded with the declaration of the result, root and env
    /// bindings.
    pub fn new(naming: NamingConfig, indent: usize) -> Self {
        let preamble = format!(
            "{}local {}, {}, {} = nil, nil, {{}}\n",
            " ".repeat(indent),
            naming.result,
            naming.root,
            naming.env
        );
        Assembler {
            naming,
            fragment: CodeFragment {
                body: preamble,
                ..Default::default()
            },
        }
    }

    /// Append the fragment of the next task
    pub fn push(&mut self, fragment: CodeFragment) {
        self.fragment = std::mem::take(&mut self.fragment).append(fragment);
    }

    /// Wrap the accumulated sections into both payloads
    pub fn finish(self) -> CompiledProgram {
        let CodeFragment {
            module_imports,
            runtime_imports,
            body,
            diagnostics,
            imports,
            steps,
        } = self.fragment;

        let mut module_payload = String::new();
        if imports
            .iter()
            .any(|import| matches!(import.source, ImportSource::Module { .. }))
        {
            module_payload.push_str(ir::MODULE_LOADER_SOURCE);
        }
        module_payload.push_str(&module_imports);
        module_payload.push_str("local function main()\n");
        module_payload.push_str(&body);
        module_payload.push_str("end\n\nreturn main\n");

        let mut runtime_payload = runtime_imports;
        runtime_payload.push_str(&body);

        CompiledProgram {
            module_payload,
            runtime_payload,
            program: Program {
                imports,
                steps,
                naming: self.naming,
            },
            diagnostics,
        }
    }
}
