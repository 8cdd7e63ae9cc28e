use thiserror::Error;

#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error("invalid working directory '{path}': {reason}")]
    InvalidWorkingDir { path: String, reason: String },

    #[error("privilege change failed: {0}")]
    PrivilegeChange(String),

    #[error("malformed PID record in {path}: {reason}")]
    PidFile { path: String, reason: String },

    #[error("failed to signal process {pid}: {reason}")]
    Signal { pid: i32, reason: String },

    #[error("daemonize failed: {0}")]
    Daemonize(String),

    #[error("already running with PID {pid}")]
    AlreadyRunning { pid: u32 },

    #[error("worker failed: {0}")]
    Worker(String),

    #[error("timed out waiting for process {pid} to exit")]
    StopTimeout { pid: i32 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SupervisorError>;
