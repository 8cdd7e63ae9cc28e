//! Invocation configuration: argv + environment resolved into an immutable record.
//!
//! Resolution never touches process state: no chdir, no environment mutation,
//! no filesystem writes. The working directory is only validated here; the
//! supervisor performs the actual chdir when it starts the worker.

use crate::args::{Cli, Commands};
use crate::clienv;
use crate::error::{Result, SupervisorError};
use std::path::{Path, PathBuf};

/// The three control verbs accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Stop,
    Restart,
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::Start => write!(f, "start"),
            Command::Stop => write!(f, "stop"),
            Command::Restart => write!(f, "restart"),
        }
    }
}

/// Validated per-invocation configuration. Built once, immutable afterwards.
#[derive(Debug, Clone)]
pub struct Config {
    pub command: Command,
    pub environment: String,
    pub pid_file: PathBuf,
    pub log_file: PathBuf,
    /// Absolute path; guaranteed to exist and be a directory.
    pub working_dir: PathBuf,
    pub run_as_user: Option<String>,
    pub run_as_group: Option<String>,
    pub daemonize: bool,
}

impl Config {
    /// Resolve parsed arguments and environment defaults into a `Config`.
    pub fn resolve(cli: &Cli) -> Result<Self> {
        let command = match cli.command {
            Commands::Start(_) => Command::Start,
            Commands::Stop(_) => Command::Stop,
            Commands::Restart(_) => Command::Restart,
        };
        let args = cli.command.common();

        let working_dir = resolve_working_dir(args.working_dir.as_deref())?;

        Ok(Self {
            command,
            environment: args
                .environment
                .clone()
                .unwrap_or_else(clienv::environment),
            pid_file: args.pid_file.clone().unwrap_or_else(clienv::pid_file_path),
            log_file: args.log_file.clone().unwrap_or_else(clienv::log_file_path),
            working_dir,
            run_as_user: args.user.clone(),
            run_as_group: args.group.clone(),
            daemonize: args.daemonize,
        })
    }

    /// Force background mode on, regardless of what argv said.
    ///
    /// Embedding callers use this when the host environment requires a
    /// detached worker (e.g. production bootstrap scripts).
    pub fn daemonized(mut self) -> Self {
        self.daemonize = true;
        self
    }
}

/// Expand the requested working directory to an absolute path and require it
/// to be an existing directory. `None` means the current directory.
fn resolve_working_dir(requested: Option<&Path>) -> Result<PathBuf> {
    let path = match requested {
        Some(p) => p.to_path_buf(),
        None => std::env::current_dir()?,
    };

    let absolute = path.canonicalize().map_err(|e| SupervisorError::InvalidWorkingDir {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;

    if !absolute.is_dir() {
        return Err(SupervisorError::InvalidWorkingDir {
            path: absolute.display().to_string(),
            reason: "not a directory".to_string(),
        });
    }

    Ok(absolute)
}
