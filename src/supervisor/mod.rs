//! Process supervision: a signal-driven state machine around one worker.
//!
//! One invocation handles exactly one command:
//!
//! - `start` installs signal handlers, optionally detaches into a daemon
//!   (recording its PID and dropping privileges), then blocks in the
//!   worker's `start()` until a terminal signal arrives.
//! - `stop` signals the PID a previous `start` recorded; a missing or dead
//!   target is idempotent success, not an error.
//! - `restart` runs `stop`, waits (bounded) for the old process to go away,
//!   then runs `start`.
//!
//! Control invocations are fully synchronous; only `start` builds a tokio
//! runtime, and only after any fork, since forking a process with live
//! runtime threads is not survivable.

pub mod daemonize;
pub mod identity;
pub mod pidfile;
pub mod signals;

use crate::config::{Command, Config};
use crate::error::{Result, SupervisorError};
use crate::worker::Worker;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use pidfile::PidFile;
use signals::SignalAction;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Lifecycle of a supervised start, logged on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    NotRunning,
    Starting,
    Daemonized,
    Running,
    Stopping,
    Terminated,
}

/// How a signal action asked the supervised process to end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shutdown {
    /// Worker stopped, PID record removed; exit 0.
    Graceful,
    /// No cleanup beyond a best-effort PID record removal; exit non-zero.
    Forced,
}

/// Poll cadence for `restart` waiting on the old process to exit.
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(100);
const STOP_POLL_ATTEMPTS: u32 = 50;

pub struct ProcessSupervisor {
    config: Config,
    worker: Arc<dyn Worker>,
    state: Mutex<SupervisorState>,
}

impl ProcessSupervisor {
    pub fn new(config: Config, worker: Arc<dyn Worker>) -> Self {
        Self {
            config,
            worker,
            state: Mutex::new(SupervisorState::NotRunning),
        }
    }

    pub fn state(&self) -> SupervisorState {
        *self.state.lock().expect("state lock poisoned")
    }

    fn transition(&self, to: SupervisorState) {
        let mut state = self.state.lock().expect("state lock poisoned");
        debug!(from = ?*state, to = ?to, "state transition");
        *state = to;
    }

    /// Execute the configured command.
    pub fn dispatch(&self) -> Result<()> {
        info!(
            command = %self.config.command,
            environment = %self.config.environment,
            pid_file = %self.config.pid_file.display(),
            "dispatching"
        );
        match self.config.command {
            Command::Start => self.start(),
            Command::Stop => self.stop(),
            Command::Restart => self.restart(),
        }
    }

    /// Bring the worker up, in the foreground or as a daemon.
    fn start(&self) -> Result<()> {
        self.transition(SupervisorState::Starting);

        // An unknown user or group must fail this command, not just the
        // child: past the fork, the parent has already exited 0 and the
        // error would only ever reach the log file.
        identity::verify(
            self.config.run_as_user.as_deref(),
            self.config.run_as_group.as_deref(),
        )?;

        if self.config.daemonize {
            // Refuse to stack a second daemon on a live record. Checked
            // before forking so the error still reaches the terminal.
            let guard = PidFile::new(&self.config.pid_file);
            if let Some(pid) = guard.running_pid()? {
                return Err(SupervisorError::AlreadyRunning { pid });
            }
            daemonize::detach()?;
        }

        nix::unistd::chdir(&self.config.working_dir).map_err(|e| {
            SupervisorError::InvalidWorkingDir {
                path: self.config.working_dir.display().to_string(),
                reason: e.to_string(),
            }
        })?;

        let runtime = tokio::runtime::Runtime::new()?;
        runtime.block_on(self.run())
    }

    /// Daemon body: handlers first, then PID publication and privilege drop,
    /// then the worker loop. The ordering is the point: the PID is not
    /// publishable before every handler is in place, so no signal addressed
    /// to the recorded PID can be lost.
    async fn run(&self) -> Result<()> {
        let mut actions = signals::install_handlers();

        let pid_file = if self.config.daemonize {
            let pid_file = PidFile::new(&self.config.pid_file);
            pid_file.write(std::process::id())?;
            self.transition(SupervisorState::Daemonized);

            if let Err(e) = identity::drop_privileges(
                self.config.run_as_user.as_deref(),
                self.config.run_as_group.as_deref(),
            ) {
                // The record must not outlive this process.
                let _ = pid_file.remove();
                return Err(e);
            }
            Some(pid_file)
        } else {
            None
        };

        self.transition(SupervisorState::Running);
        info!(
            pid = std::process::id(),
            environment = %self.config.environment,
            daemonized = self.config.daemonize,
            "worker starting"
        );

        let worker = Arc::clone(&self.worker);
        let mut worker_task = tokio::spawn(async move { worker.start().await });

        loop {
            tokio::select! {
                exited = &mut worker_task => {
                    info!("worker loop exited on its own");
                    if let Some(pid_file) = &pid_file {
                        let _ = pid_file.remove();
                    }
                    self.transition(SupervisorState::Terminated);
                    return match exited {
                        Ok(Ok(())) => Ok(()),
                        Ok(Err(e)) => Err(SupervisorError::Worker(e.to_string())),
                        Err(e) => Err(SupervisorError::Worker(e.to_string())),
                    };
                }
                Some(action) = actions.recv() => {
                    match self.handle_action(action, pid_file.as_ref()).await {
                        Some(Shutdown::Graceful) => {
                            self.transition(SupervisorState::Terminated);
                            return Ok(());
                        }
                        Some(Shutdown::Forced) => {
                            // Reached only when the forced kill could not be
                            // delivered (or in foreground mode).
                            std::process::exit(1);
                        }
                        None => {}
                    }
                }
            }
        }
    }

    /// React to one signal action. Returns how to shut down, if at all.
    ///
    /// Runs while the worker loop is suspended in select; it only stops the
    /// worker, touches the PID record, sends signals and logs.
    async fn handle_action(
        &self,
        action: SignalAction,
        pid_file: Option<&PidFile>,
    ) -> Option<Shutdown> {
        match action {
            SignalAction::Reload => {
                warn!("reload requested, but live reload is unsupported; restart instead");
                None
            }
            SignalAction::Restart => {
                warn!("restart signal ignored; restart is a command-line verb");
                None
            }
            SignalAction::Breakpoint => {
                warn!("breakpoint signal is unsupported");
                None
            }
            SignalAction::Info => {
                let stats = self.worker.stats();
                match serde_json::to_string(&stats) {
                    Ok(json) => info!(stats = %json, "worker statistics"),
                    Err(e) => warn!(error = %e, "could not render worker statistics"),
                }
                None
            }
            SignalAction::GracefulExit => {
                self.transition(SupervisorState::Stopping);
                info!("graceful shutdown requested");
                if let Err(e) = self.worker.stop().await {
                    warn!(error = %e, "worker stop reported an error");
                }
                if let Some(pid_file) = pid_file {
                    if let Err(e) = pid_file.remove() {
                        warn!(error = %e, "could not remove PID file");
                    }
                }
                Some(Shutdown::Graceful)
            }
            SignalAction::ExitNow => {
                warn!("forced shutdown requested");
                if let Some(pid_file) = pid_file {
                    let recorded = pid_file.read().ok().flatten();
                    // Deletion failure is deliberately ignored on this path.
                    let _ = pid_file.remove();
                    let target = recorded.unwrap_or_else(std::process::id);
                    // Unconditional kill; when the record names this
                    // process, nothing below this line runs.
                    if let Err(e) = kill(Pid::from_raw(target as i32), Signal::SIGKILL) {
                        error!(pid = target, error = %e, "forced kill failed");
                    }
                }
                Some(Shutdown::Forced)
            }
        }
    }

    /// Signal the recorded process to shut down gracefully.
    ///
    /// Idempotent: a missing record or a dead target logs "not running" and
    /// succeeds. A dead target's stale record is removed, since its
    /// termination is thereby confirmed.
    fn stop(&self) -> Result<()> {
        self.transition(SupervisorState::Stopping);
        let pid_file = PidFile::new(&self.config.pid_file);

        let pid = match pid_file.read()? {
            Some(pid) => pid,
            None => {
                info!("not running (no PID file)");
                return Ok(());
            }
        };

        if !pidfile::process_exists(pid) {
            info!(pid, "not running (stale PID record removed)");
            let _ = pid_file.remove();
            return Ok(());
        }

        kill(Pid::from_raw(pid as i32), Signal::SIGTERM).map_err(|e| {
            SupervisorError::Signal {
                pid: pid as i32,
                reason: e.to_string(),
            }
        })?;
        info!(pid, "sent SIGTERM");
        Ok(())
    }

    /// `stop`, then a bounded wait for the old process to disappear, then
    /// `start`. The wait closes the gap between signalling the old daemon
    /// and re-claiming its PID file: proceeding while it still lives would
    /// race the dying instance over the record.
    fn restart(&self) -> Result<()> {
        self.stop()?;
        self.await_termination()?;
        self.start()
    }

    fn await_termination(&self) -> Result<()> {
        let pid_file = PidFile::new(&self.config.pid_file);
        let mut last_seen = None;

        for _ in 0..STOP_POLL_ATTEMPTS {
            match pid_file.running_pid()? {
                None => return Ok(()),
                Some(pid) => {
                    last_seen = Some(pid);
                    std::thread::sleep(STOP_POLL_INTERVAL);
                }
            }
        }

        let pid = last_seen.unwrap_or_default();
        error!(pid, "old process did not exit in time; not starting a new one");
        Err(SupervisorError::StopTimeout { pid: pid as i32 })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::WorkerStats;
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct MockWorker {
        stops: AtomicUsize,
    }

    impl MockWorker {
        fn new() -> Self {
            Self {
                stops: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Worker for MockWorker {
        async fn start(&self) -> anyhow::Result<()> {
            Ok(())
        }

        async fn stop(&self) -> anyhow::Result<()> {
            self.stops.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn stats(&self) -> WorkerStats {
            WorkerStats {
                connections: 4,
                queued: 2,
                processed: 7,
            }
        }
    }

    fn config_with(command: Command, pid_file: &Path) -> Config {
        Config {
            command,
            environment: "test".to_string(),
            pid_file: pid_file.to_path_buf(),
            log_file: pid_file.with_extension("log"),
            working_dir: std::env::current_dir().unwrap(),
            run_as_user: None,
            run_as_group: None,
            daemonize: false,
        }
    }

    fn supervisor(command: Command, pid_file: &Path) -> (ProcessSupervisor, Arc<MockWorker>) {
        let worker = Arc::new(MockWorker::new());
        let sup = ProcessSupervisor::new(config_with(command, pid_file), worker.clone());
        (sup, worker)
    }

    #[test]
    fn test_stop_without_pid_file_is_idempotent_success() {
        let dir = tempfile::tempdir().unwrap();
        let (sup, _) = supervisor(Command::Stop, &dir.path().join("q.pid"));
        sup.dispatch().unwrap();
        assert_eq!(sup.state(), SupervisorState::Stopping);
    }

    #[test]
    fn test_stop_with_stale_record_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("q.pid");
        let pid_file = PidFile::new(&path);
        pid_file.write(99999).unwrap();

        let (sup, _) = supervisor(Command::Stop, &path);
        sup.dispatch().unwrap();
        assert!(!pid_file.exists(), "stale record should be removed");
    }

    #[test]
    fn test_stop_with_garbage_record_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("q.pid");
        std::fs::write(&path, "bogus\n").unwrap();

        let (sup, _) = supervisor(Command::Stop, &path);
        let err = sup.dispatch().unwrap_err();
        assert!(matches!(err, SupervisorError::PidFile { .. }));
    }

    #[test]
    fn test_await_termination_returns_immediately_when_gone() {
        let dir = tempfile::tempdir().unwrap();
        let (sup, _) = supervisor(Command::Restart, &dir.path().join("q.pid"));
        sup.await_termination().unwrap();
    }

    #[tokio::test]
    async fn test_graceful_action_stops_worker_and_removes_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("q.pid");
        let pid_file = PidFile::new(&path);
        pid_file.write(std::process::id()).unwrap();

        let (sup, worker) = supervisor(Command::Start, &path);
        let shutdown = sup
            .handle_action(SignalAction::GracefulExit, Some(&pid_file))
            .await;

        assert_eq!(shutdown, Some(Shutdown::Graceful));
        assert_eq!(worker.stops.load(Ordering::SeqCst), 1);
        assert!(!pid_file.exists());
    }

    #[tokio::test]
    async fn test_exit_now_removes_record_and_kills_recorded_pid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("q.pid");
        let pid_file = PidFile::new(&path);
        // A dead PID: the SIGKILL cannot land, which is exactly what lets
        // this test observe the path instead of dying to it.
        pid_file.write(99999).unwrap();

        let (sup, worker) = supervisor(Command::Start, &path);
        let shutdown = sup
            .handle_action(SignalAction::ExitNow, Some(&pid_file))
            .await;

        assert_eq!(shutdown, Some(Shutdown::Forced));
        assert_eq!(worker.stops.load(Ordering::SeqCst), 0, "stop() must not run");
        assert!(!pid_file.exists());
    }

    #[tokio::test]
    async fn test_informational_actions_do_not_shut_down() {
        let dir = tempfile::tempdir().unwrap();
        let (sup, worker) = supervisor(Command::Start, &dir.path().join("q.pid"));

        for action in [
            SignalAction::Reload,
            SignalAction::Restart,
            SignalAction::Breakpoint,
            SignalAction::Info,
        ] {
            assert_eq!(sup.handle_action(action, None).await, None);
        }
        assert_eq!(worker.stops.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_daemonized_start_rejects_unknown_user_before_forking() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_with(Command::Start, &dir.path().join("q.pid"));
        config.daemonize = true;
        config.run_as_user = Some("no-such-user-qworkerd".to_string());
        let sup = ProcessSupervisor::new(config, Arc::new(MockWorker::new()));

        // Errors while this process is still the invoking one; a fork
        // would have detached the test run entirely.
        let err = sup.start().unwrap_err();
        assert!(matches!(err, SupervisorError::PrivilegeChange(_)));
    }

    #[test]
    fn test_daemonized_start_refuses_live_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("q.pid");
        PidFile::new(&path).write(std::process::id()).unwrap();

        let mut config = config_with(Command::Start, &path);
        config.daemonize = true;
        let sup = ProcessSupervisor::new(config, Arc::new(MockWorker::new()));

        let err = sup.start().unwrap_err();
        assert!(matches!(err, SupervisorError::AlreadyRunning { .. }));
    }
}
