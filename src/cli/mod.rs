//! CLI interface and argument parsing
//!
//! This module handles command-line parsing, task file discovery and the
//! `run` and `build` subcommands.

pub mod app;

// Re-export main types
pub use app::*;
