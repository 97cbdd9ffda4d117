//! Program execution
//!
//! This module runs compiled programs: the step interpreter, the built-in
//! registry it exposes, and external command spawning.

pub mod builtins;
pub mod command;
pub mod interpreter;

// Re-export main types
pub use builtins::{Builtin, Registry};
pub use command::{capture_command, execute_command, CommandOutput};
pub use interpreter::{install_capabilities, run, Capabilities, Outcome};
