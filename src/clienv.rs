use std::path::PathBuf;

pub const ENV_ENVIRONMENT: &str = "QWORKERD_ENV";
pub const ENV_PID_FILE: &str = "QWORKERD_PID_FILE";
pub const ENV_LOG_FILE: &str = "QWORKERD_LOG_FILE";

const QWORKERD_SUBDIR: &str = "qworkerd";
const DEFAULT_ENVIRONMENT: &str = "development";

fn env_opt(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn env_or(name: &str, default: &str) -> String {
    env_opt(name).unwrap_or_else(|| default.to_string())
}

/// qworkerd data directory (~/.local/share/qworkerd)
pub fn data_dir() -> PathBuf {
    let dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("~/.local/share"))
        .join(QWORKERD_SUBDIR);
    tracing::trace!(dir = %dir.display(), "Resolved data directory");
    dir
}

/// Environment profile name ($QWORKERD_ENV or "development")
pub fn environment() -> String {
    let env = env_or(ENV_ENVIRONMENT, DEFAULT_ENVIRONMENT);
    tracing::trace!(environment = %env, "Environment profile");
    env
}

/// Default PID file path ($QWORKERD_PID_FILE or ~/.local/share/qworkerd/qworkerd.pid)
pub fn pid_file_path() -> PathBuf {
    let path = env_opt(ENV_PID_FILE)
        .map(PathBuf::from)
        .unwrap_or_else(|| data_dir().join("qworkerd.pid"));
    tracing::trace!(path = %path.display(), "PID file path");
    path
}

/// Default log file path ($QWORKERD_LOG_FILE or ~/.local/share/qworkerd/logs/qworkerd.log)
pub fn log_file_path() -> PathBuf {
    let path = env_opt(ENV_LOG_FILE)
        .map(PathBuf::from)
        .unwrap_or_else(|| data_dir().join("logs").join("qworkerd.log"));
    tracing::trace!(path = %path.display(), "Log file path");
    path
}
