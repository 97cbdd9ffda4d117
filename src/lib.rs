//! ys - compile YAML task lists into Lua programs
//!
//! A task list names functions and commands to invoke, with templated
//! arguments, optional imports and loops. The compiler folds everything known
//! at build time into constants and emits two Lua payloads plus a structured
//! program the interpreter runs directly.

// Public modules
pub mod cli;
pub mod compiler;
pub mod config;
pub mod context;
pub mod dist;
pub mod error;
pub mod eval;
pub mod runner;

// Re-export commonly used types
pub use compiler::{compile_tasks, CompileOptions, CompiledProgram, Compiler};
pub use context::PublicContext;
pub use error::{Result, YsError};
pub use runner::{run, Capabilities, Outcome};

/// Current version of ys
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
