//! Common test utilities

#![allow(dead_code)]

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Command for the ys binary
pub fn ys_cmd() -> Command {
    cargo_bin_cmd!("ys")
}

/// Create a temporary directory with a hello.ys.yml task file
pub fn create_task_file(content: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("hello.ys.yml");
    fs::write(&path, content).unwrap();
    (temp_dir, path)
}

/// Write a file below `dir`, creating parent directories
pub fn write_file(dir: &Path, relative: &str, content: &str) -> PathBuf {
    let path = dir.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, content).unwrap();
    path
}
