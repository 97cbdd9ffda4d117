//! Configuration parsing
//!
//! This module handles parsing of `.ys.yml` task files and the optional
//! compiler settings file.

pub mod parse;
pub mod types;

// Re-export main types
pub use parse::*;
pub use types::*;
