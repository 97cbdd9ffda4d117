//! Artifact persistence
//!
//! `ys build` writes each compiled task file under the dist directory,
//! keeping its relative path and swapping the `.ys.yml` extension.

use crate::compiler::CompiledProgram;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

/// Extension of the module payload
pub const MODULE_EXT: &str = ".lua";

/// Extension of the runtime payload
pub const RUNTIME_EXT: &str = ".runtime.lua";

/// Replace the extension of `path` with `ext`
///
/// The last extension is dropped, then a trailing `.ys`, so both
/// `hello.ys.yml` and `hello.yml` become `hello<ext>`.
pub fn change_ext(path: &Path, ext: &str) -> PathBuf {
    let Some(name) = path.file_name().map(|name| name.to_string_lossy()) else {
        return path.to_path_buf();
    };

    let stem = match name.rfind('.') {
        Some(dot) if dot > 0 => &name[..dot],
        _ => &name[..],
    };
    let stem = stem.strip_suffix(".ys").unwrap_or(stem);

    path.with_file_name(format!("{}{}", stem, ext))
}

/// Path under `dist` for the artifact of `relative`
///
/// Root, prefix and `..` components are dropped so the artifact always lands
/// inside `dist`.
pub fn dist_file_path(relative: &Path, ext: &str, dist: &Path) -> PathBuf {
    let inner: PathBuf = relative
        .components()
        .filter(|component| matches!(component, Component::Normal(_)))
        .collect();
    dist.join(change_ext(&inner, ext))
}

/// Write the payloads of a compiled file, returning the written paths
pub fn write_artifacts(
    program: &CompiledProgram,
    relative: &Path,
    dist: &Path,
    with_runtime: bool,
) -> io::Result<Vec<PathBuf>> {
    let mut artifacts = vec![(dist_file_path(relative, MODULE_EXT, dist), &program.module_payload)];
    if with_runtime {
        artifacts.push((
            dist_file_path(relative, RUNTIME_EXT, dist),
            &program.runtime_payload,
        ));
    }

    let mut written = Vec::with_capacity(artifacts.len());
    for (path, contents) in artifacts {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, contents)?;
        tracing::info!("wrote {}", path.display());
        written.push(path);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::{compile_tasks, CompileOptions};
    use crate::config::Task;
    use tempfile::TempDir;

    #[test]
    fn test_change_ext() {
        assert_eq!(
            change_ext(Path::new("tasks/hello.ys.yml"), ".lua"),
            PathBuf::from("tasks/hello.lua")
        );
        assert_eq!(
            change_ext(Path::new("hello.yml"), ".runtime.lua"),
            PathBuf::from("hello.runtime.lua")
        );
        assert_eq!(change_ext(Path::new("hello"), ".lua"), PathBuf::from("hello.lua"));
        assert_eq!(change_ext(Path::new(".ys.yml"), ".lua"), PathBuf::from(".lua"));
    }

    #[test]
    fn test_dist_file_path() {
        let dist = Path::new("dist");
        assert_eq!(
            dist_file_path(Path::new("a/b.ys.yml"), MODULE_EXT, dist),
            PathBuf::from("dist/a/b.lua")
        );
        assert_eq!(
            dist_file_path(Path::new("../up/c.ys.yml"), MODULE_EXT, dist),
            PathBuf::from("dist/up/c.lua")
        );
        assert_eq!(
            dist_file_path(Path::new("./d.ys.yml"), RUNTIME_EXT, dist),
            PathBuf::from("dist/d.runtime.lua")
        );
    }

    #[test]
    fn test_write_artifacts() {
        let temp_dir = TempDir::new().unwrap();
        let dist = temp_dir.path().join("dist");
        let program = compile_tasks(&[Task::new("print")], CompileOptions::default()).unwrap();

        let written =
            write_artifacts(&program, Path::new("nested/hello.ys.yml"), &dist, false).unwrap();
        assert_eq!(written, vec![dist.join("nested/hello.lua")]);
        assert_eq!(
            fs::read_to_string(&written[0]).unwrap(),
            program.module_payload
        );

        let written =
            write_artifacts(&program, Path::new("nested/hello.ys.yml"), &dist, true).unwrap();
        assert_eq!(written.len(), 2);
        assert_eq!(
            fs::read_to_string(dist.join("nested/hello.runtime.lua")).unwrap(),
            program.runtime_payload
        );
    }
}
