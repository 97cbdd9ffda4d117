//! Error types for ys

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for ys operations
pub type Result<T> = std::result::Result<T, YsError>;

/// Main error type for ys
#[derive(Error, Debug)]
pub enum YsError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Task compilation errors
    #[error("Compile error: {0}")]
    Compile(#[from] CompileError),

    /// Errors raised while running a compiled program
    #[error("Runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// YAML parsing errors
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Task file and compiler configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("File not found: {0}")]
    NotFound(PathBuf),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to read '{path}': {error}")]
    Read { path: PathBuf, error: String },

    #[error("No task files given, pass files, --dir or --all")]
    NoFiles,
}

/// Placeholder parsing errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error("Invalid template variable: {0}")]
    EmptyExpression(String),

    #[error("Unterminated template variable: {0}")]
    Malformed(String),
}

/// Host expression evaluation errors
#[derive(Error, Debug)]
pub enum EvalError {
    /// A referenced name has no binding in the evaluation scope
    #[error("'{0}' is not defined")]
    Unbound(String),

    #[error("{0}")]
    Lua(#[from] mlua::Error),
}

/// Task compilation errors
#[derive(Error, Debug)]
pub enum CompileError {
    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error("Failed to evaluate expression: {0}")]
    Eval(#[from] EvalError),

    #[error("can't find function {0}, did you forget `from` param?")]
    UnresolvedTarget(String),

    #[error("invalid args, setVars args must be object")]
    InvalidSetVarsArgs,

    #[error("invalid loop params: {0}")]
    InvalidLoop(String),

    #[error("'{0}' is not defined at compile time and is never bound at run time")]
    UndefinedName(String),

    #[error("'{0}' is not a valid binding name")]
    InvalidBinding(String),
}

/// Errors raised by the interpreter while running a compiled program
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error(transparent)]
    Eval(#[from] EvalError),

    #[error("'{0}' is not a function")]
    NotCallable(String),

    #[error("loop source must be a sequence, got {0}")]
    InvalidLoopSource(String),

    #[error("Failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to import '{from}': {error}")]
    Import { from: String, error: String },
}

impl From<mlua::Error> for RuntimeError {
    fn from(err: mlua::Error) -> Self {
        RuntimeError::Eval(EvalError::from(err))
    }
}

/// Specialized result type for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Specialized result type for placeholder parsing
pub type TemplateResult<T> = std::result::Result<T, TemplateError>;

/// Specialized result type for expression evaluation
pub type EvalResult<T> = std::result::Result<T, EvalError>;

/// Specialized result type for compilation
pub type CompileResult<T> = std::result::Result<T, CompileError>;

/// Specialized result type for program execution
pub type RuntimeResult<T> = std::result::Result<T, RuntimeError>;
