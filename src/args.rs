use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "qworkerd")]
#[command(version)]
#[command(about = "Supervise the queue worker daemon", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Start the worker, optionally as a background daemon
    Start(CommonArgs),

    /// Signal a previously started worker to shut down gracefully
    Stop(CommonArgs),

    /// Stop the worker, wait for it to exit, then start it again
    Restart(CommonArgs),
}

impl Commands {
    pub fn common(&self) -> &CommonArgs {
        match self {
            Commands::Start(args) | Commands::Stop(args) | Commands::Restart(args) => args,
        }
    }
}

#[derive(Debug, Args)]
pub struct CommonArgs {
    /// Environment profile (default: $QWORKERD_ENV or "development")
    #[arg(short = 'e', long = "environment")]
    pub environment: Option<String>,

    /// PID file path (default: $QWORKERD_PID_FILE or the data directory)
    #[arg(short = 'p', long = "pid-file")]
    pub pid_file: Option<PathBuf>,

    /// Log file path, used when daemonized (default: $QWORKERD_LOG_FILE)
    #[arg(short = 'l', long = "log-file")]
    pub log_file: Option<PathBuf>,

    /// Working directory to run in (default: current directory)
    #[arg(short = 'c', long = "chdir")]
    pub working_dir: Option<PathBuf>,

    /// Drop privileges to this user before starting the worker
    #[arg(short = 'u', long = "user")]
    pub user: Option<String>,

    /// Drop privileges to this group before starting the worker
    #[arg(short = 'g', long = "group")]
    pub group: Option<String>,

    /// Detach from the terminal and run in the background
    #[arg(short = 'd', long = "daemonize")]
    pub daemonize: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn test_parse_start_with_options() {
        let cli = Cli::try_parse_from([
            "qworkerd", "start", "-d", "-u", "nobody", "-p", "/tmp/q.pid",
        ])
        .unwrap();
        let Commands::Start(args) = cli.command else {
            panic!("expected start");
        };
        assert!(args.daemonize);
        assert_eq!(args.user.as_deref(), Some("nobody"));
        assert_eq!(args.pid_file.as_deref(), Some(std::path::Path::new("/tmp/q.pid")));
        assert!(args.group.is_none());
    }

    #[test]
    fn test_missing_command_is_a_parse_error() {
        let err = Cli::try_parse_from(["qworkerd"]).unwrap_err();
        assert_eq!(
            err.kind(),
            ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
        );
        // main's exit-code mapping hinges on this being an error, not help.
        assert!(err.use_stderr());
    }

    #[test]
    fn test_unknown_command_is_a_parse_error() {
        let err = Cli::try_parse_from(["qworkerd", "reload"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidSubcommand);
    }

    #[test]
    fn test_help_is_reported_as_display_help() {
        let err = Cli::try_parse_from(["qworkerd", "--help"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DisplayHelp);
    }
}
