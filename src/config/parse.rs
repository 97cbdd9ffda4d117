//! Task file and compiler config parsing

use crate::config::types::{CompilerConfig, Task};
use crate::error::{ConfigError, ConfigResult, YsError};
use std::fs;
use std::path::Path;

/// Suffix of task files discovered with `--dir` and `--all`
pub const TASK_FILE_SUFFIX: &str = ".ys.yml";

/// Parse a task list from a YAML string
///
/// The document must be a sequence of tasks; an empty document is an empty list.
pub fn parse_tasks(yaml: &str) -> Result<Vec<Task>, YsError> {
    if yaml.trim().is_empty() {
        return Ok(Vec::new());
    }
    let value: serde_yaml::Value = serde_yaml::from_str(yaml)?;
    match value {
        serde_yaml::Value::Sequence(_) => Ok(serde_yaml::from_value(value)?),
        serde_yaml::Value::Null => Ok(Vec::new()),
        _ => Err(ConfigError::Invalid("a task file must contain a list of tasks".to_string()).into()),
    }
}

/// Parse a task list from a file
pub fn parse_tasks_file(path: &Path) -> Result<Vec<Task>, YsError> {
    parse_tasks(&read(path)?)
}

/// Parse compiler settings from a YAML file
pub fn parse_compiler_config_file(path: &Path) -> Result<CompilerConfig, YsError> {
    let contents = read(path)?;
    if contents.trim().is_empty() {
        return Ok(CompilerConfig::default());
    }
    Ok(serde_yaml::from_str(&contents)?)
}

fn read(path: &Path) -> ConfigResult<String> {
    if !path.is_file() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }
    fs::read_to_string(path).map_err(|e| ConfigError::Read {
        path: path.to_path_buf(),
        error: e.to_string(),
    })
}
