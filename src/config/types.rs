//! Core configuration types
//!
//! This module defines the task records read from a `.ys.yml` file and the
//! naming conventions the compiler emits code with.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single task definition
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Task {
    /// Import source for the invocation target (may be templated)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,

    /// Invocation target: a name, a dotted name, `:program` or `setVars`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r#use: Option<String>,

    /// Arguments passed to the target
    #[serde(
        default,
        skip_serializing_if = "Vec::is_empty",
        deserialize_with = "deserialize_args"
    )]
    pub args: Vec<Value>,

    /// Iteration source: a literal sequence or a templated expression
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r#loop: Option<Value>,
}

impl Task {
    /// Create a task calling `target`
    pub fn new(target: impl Into<String>) -> Self {
        Task {
            r#use: Some(target.into()),
            ..Default::default()
        }
    }

    /// Set the import source
    pub fn with_from(mut self, from: impl Into<String>) -> Self {
        self.from = Some(from.into());
        self
    }

    /// Set the arguments
    pub fn with_args(mut self, args: Vec<Value>) -> Self {
        self.args = args;
        self
    }

    /// Set the iteration source
    pub fn with_loop(mut self, source: Value) -> Self {
        self.r#loop = Some(source);
        self
    }
}

/// Names the compiler uses in generated code
///
/// Every field has a default, so a config file only needs the names it
/// overrides.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct NamingConfig {
    /// Binding holding the last task result
    pub result: String,

    /// Root binding, declared empty
    pub root: String,

    /// Environment binding, declared as an empty table
    pub env: String,

    /// Per-iteration item binding
    pub item: String,

    /// Per-iteration index binding
    pub index: String,

    /// Placeholder target for tasks without `use`
    pub default_use: String,

    /// Name of the capability object in the runtime payload
    pub capabilities: String,

    /// Parameter name of precompiled template functions
    pub context_param: String,

    /// Reserved target that declares bindings
    pub set_vars: String,

    /// Prefix marking an external command
    pub command_sigil: String,

    /// Module the built-in functions are required from
    pub builtin_package: String,
}

impl Default for NamingConfig {
    fn default() -> Self {
        NamingConfig {
            result: "result".to_string(),
            root: "root".to_string(),
            env: "env".to_string(),
            item: "item".to_string(),
            index: "index".to_string(),
            default_use: "__ys_use".to_string(),
            capabilities: "__capabilities".to_string(),
            context_param: "__ctx".to_string(),
            set_vars: "setVars".to_string(),
            command_sigil: ":".to_string(),
            builtin_package: "ys.globals".to_string(),
        }
    }
}

/// Compiler settings file (`--config`)
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct CompilerConfig {
    /// Naming overrides
    #[serde(default)]
    pub naming: NamingConfig,

    /// Reject deferred names that are never bound at run time
    #[serde(default)]
    pub strict: bool,
}

/// Custom deserializer for args that accepts a single value or a sequence
fn deserialize_args<'de, D>(deserializer: D) -> Result<Vec<Value>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;

    match value {
        // Array of arguments
        Value::Array(items) => Ok(items),
        // Null or not present
        Value::Null => Ok(Vec::new()),
        // Any other value is a single argument
        other => Ok(vec![other]),
    }
}
