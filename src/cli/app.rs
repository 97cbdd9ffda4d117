//! Main CLI application

use crate::compiler::{CompileOptions, CompiledProgram, Compiler};
use crate::config::{parse_compiler_config_file, parse_tasks_file, CompilerConfig, TASK_FILE_SUFFIX};
use crate::context::PublicContext;
use crate::dist;
use crate::error::{ConfigError, YsError};
use crate::runner::{self, Capabilities, Outcome, Registry};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use colored::Colorize;
use std::collections::HashSet;
use std::env;
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Default output directory of `ys build`
pub const DEFAULT_DIST: &str = "dist";

/// CLI application
pub struct App {
    /// The clap command
    command: Command,
    /// Directory task paths are resolved against
    cwd: PathBuf,
}

impl App {
    /// Create the app, resolving paths against the current directory
    pub fn new() -> Result<Self, YsError> {
        Ok(App {
            command: build_command(),
            cwd: env::current_dir()?,
        })
    }

    /// Resolve paths against `cwd` instead
    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = cwd.into();
        self
    }

    /// Run with the process arguments, returning the exit code
    pub fn run(self) -> Result<i32, YsError> {
        self.run_from(env::args_os())
    }

    /// Run with explicit arguments, returning the exit code
    pub fn run_from<I, T>(self, args: I) -> Result<i32, YsError>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let matches = self.command.get_matches_from(args);
        init_logging(&matches);

        let options = load_options(&matches)?;
        let compiler = Compiler::new(options, Registry::with_defaults());

        match matches.subcommand() {
            Some(("run", sub_matches)) => {
                let files = files_from_matches(sub_matches, &self.cwd)?;
                run_files(&compiler, &files, &self.cwd)
            }
            Some(("build", sub_matches)) => {
                let files = files_from_matches(sub_matches, &self.cwd)?;
                let dist_dir = sub_matches
                    .get_one::<PathBuf>("dist")
                    .cloned()
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_DIST));
                let with_runtime = sub_matches.get_flag("runtime");
                build_files(&compiler, &files, &self.cwd.join(dist_dir), with_runtime, &self.cwd)
            }
            // `subcommand_required` rejects everything else
            _ => Ok(0),
        }
    }
}

/// Build the clap command
pub fn build_command() -> Command {
    Command::new("ys")
        .version(crate::VERSION)
        .about("Compile YAML task lists into Lua programs and run them")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Print debug output")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .value_name("LEVEL")
                .help("Log level")
                .value_parser(["debug", "info", "warn", "error"])
                .default_value("info")
                .global(true),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("FILE")
                .help("Compiler settings file")
                .value_parser(value_parser!(PathBuf))
                .global(true),
        )
        .subcommand(file_args(
            Command::new("run").about("Compile task files and run them"),
        ))
        .subcommand(
            file_args(Command::new("build").about("Compile task files into Lua modules"))
                .arg(
                    Arg::new("dist")
                        .long("dist")
                        .value_name("DIR")
                        .help("Output directory")
                        .value_parser(value_parser!(PathBuf))
                        .default_value(DEFAULT_DIST),
                )
                .arg(
                    Arg::new("runtime")
                        .long("runtime")
                        .help("Also write the runtime payload")
                        .action(ArgAction::SetTrue),
                ),
        )
}

fn file_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("files")
                .value_name("FILES")
                .help("Task files or glob patterns")
                .num_args(0..),
        )
        .arg(
            Arg::new("all")
                .short('A')
                .long("all")
                .help("Use every *.ys.yml file below the working directory")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("dir")
                .short('d')
                .long("dir")
                .value_name("DIR")
                .help("Use every *.ys.yml file below DIR")
                .value_parser(value_parser!(PathBuf))
                .action(ArgAction::Append),
        )
}

/// Install the log subscriber; `--verbose` wins over `--log-level`
fn init_logging(matches: &ArgMatches) {
    let level = if matches.get_flag("verbose") {
        "debug"
    } else {
        matches
            .get_one::<String>("log-level")
            .map(String::as_str)
            .unwrap_or("info")
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    // Already installed when running more than once in a process
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .without_time()
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

fn load_options(matches: &ArgMatches) -> Result<CompileOptions, YsError> {
    let config = match matches.get_one::<PathBuf>("config") {
        Some(path) => parse_compiler_config_file(path)?,
        None => CompilerConfig::default(),
    };
    Ok(CompileOptions::from_config(config).with_public(PublicContext::detect()))
}

fn files_from_matches(matches: &ArgMatches, cwd: &Path) -> Result<Vec<PathBuf>, YsError> {
    let patterns: Vec<String> = matches
        .get_many::<String>("files")
        .map(|values| values.cloned().collect())
        .unwrap_or_default();
    let dirs: Vec<PathBuf> = matches
        .get_many::<PathBuf>("dir")
        .map(|values| values.cloned().collect())
        .unwrap_or_default();
    collect_files(&patterns, &dirs, matches.get_flag("all"), cwd)
}

/// Resolve file arguments, `--dir` and `--all` into task files
///
/// Paths are made relative to `cwd` where possible, de-duplicated and kept in
/// the order they were found.
pub fn collect_files(
    patterns: &[String],
    dirs: &[PathBuf],
    all: bool,
    cwd: &Path,
) -> Result<Vec<PathBuf>, YsError> {
    let task_glob = format!("**/*{}", TASK_FILE_SUFFIX);
    let mut globs: Vec<String> = Vec::new();
    let mut found: Vec<PathBuf> = Vec::new();

    if all {
        globs.push(format!("{}/{}", escape(cwd), task_glob));
    }
    for dir in dirs {
        let dir = cwd.join(dir);
        if !dir.is_dir() {
            return Err(ConfigError::NotFound(dir).into());
        }
        globs.push(format!("{}/{}", escape(&dir), task_glob));
    }
    for pattern in patterns {
        if is_glob(pattern) {
            let pattern = if Path::new(pattern).is_absolute() {
                pattern.clone()
            } else {
                format!("{}/{}", escape(cwd), pattern)
            };
            globs.push(pattern);
        } else {
            let path = cwd.join(pattern);
            if !path.is_file() {
                return Err(ConfigError::NotFound(PathBuf::from(pattern)).into());
            }
            found.push(path);
        }
    }

    for pattern in &globs {
        let entries = glob::glob(pattern)
            .map_err(|e| ConfigError::Invalid(format!("bad pattern '{}': {}", pattern, e)))?;
        for entry in entries {
            match entry {
                Ok(path) if path.is_file() => found.push(path),
                Ok(_) => {}
                Err(e) => tracing::warn!("skipping {}", e),
            }
        }
    }

    let mut seen = HashSet::new();
    let files: Vec<PathBuf> = found
        .into_iter()
        .map(|path| match path.strip_prefix(cwd) {
            Ok(relative) => relative.to_path_buf(),
            Err(_) => path,
        })
        .filter(|path| seen.insert(path.clone()))
        .collect();

    if files.is_empty() {
        return Err(ConfigError::NoFiles.into());
    }
    Ok(files)
}

fn is_glob(pattern: &str) -> bool {
    pattern.contains(['*', '?', '['])
}

fn escape(path: &Path) -> String {
    glob::Pattern::escape(&path.to_string_lossy())
}

fn compile_file(compiler: &Compiler, file: &Path, cwd: &Path) -> Result<CompiledProgram, YsError> {
    tracing::info!("compiling {}", file.display().to_string().cyan());
    let tasks = parse_tasks_file(&cwd.join(file))?;
    Ok(compiler.compile(&tasks)?)
}

fn run_files(compiler: &Compiler, files: &[PathBuf], cwd: &Path) -> Result<i32, YsError> {
    for file in files {
        let program = compile_file(compiler, file, cwd)?;

        let base_dir = cwd
            .join(file)
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| cwd.to_path_buf());
        let capabilities = Capabilities::new(Registry::with_defaults()).with_base_dir(base_dir);

        match runner::run(&program.program, &capabilities) {
            Ok(Outcome::Completed) => {}
            Ok(Outcome::Exited(code)) => {
                tracing::debug!("{} exited with code {}", file.display(), code);
                return Ok(code);
            }
            Err(e) => {
                tracing::error!("{} failed", file.display().to_string().red());
                tracing::debug!("generated code:\n{}", program.runtime_payload);
                return Err(e.into());
            }
        }
    }
    Ok(0)
}

fn build_files(
    compiler: &Compiler,
    files: &[PathBuf],
    dist_dir: &Path,
    with_runtime: bool,
    cwd: &Path,
) -> Result<i32, YsError> {
    for file in files {
        let program = compile_file(compiler, file, cwd)?;
        dist::write_artifacts(&program, file, dist_dir, with_runtime)?;
    }
    Ok(0)
}

/// Run the CLI application with the process arguments
pub fn run() -> Result<i32, YsError> {
    App::new()?.run()
}
