//! The signal table and handler installation.
//!
//! Six Unix signals map onto a closed set of supervisor actions. The table is
//! plain data built once at startup; OS delivery is process-global, but the
//! dispatch mapping itself stays a local, testable structure. Each entry is
//! registered independently: one signal the platform rejects must not take
//! the rest of the table down with it.

use nix::sys::signal::Signal;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// What the supervisor does when a given signal arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalAction {
    /// Live reload is intentionally unimplemented; log and carry on.
    Reload,
    /// Forced shutdown: drop the PID record best-effort, then SIGKILL.
    ExitNow,
    /// Orderly shutdown: worker stop, PID record removal, exit 0.
    GracefulExit,
    /// Log a snapshot of the worker's queue statistics.
    Info,
    /// Restart is a command-line verb, not a live signal; log and carry on.
    Restart,
    /// Debug trap; unsupported, log and carry on.
    Breakpoint,
}

/// The fixed signal → action table; never mutated after startup.
pub const SIGNAL_TABLE: &[(Signal, SignalAction)] = &[
    (Signal::SIGHUP, SignalAction::Reload),
    (Signal::SIGINT, SignalAction::ExitNow),
    (Signal::SIGTERM, SignalAction::GracefulExit),
    (Signal::SIGUSR1, SignalAction::Info),
    (Signal::SIGUSR2, SignalAction::Restart),
    (Signal::SIGTRAP, SignalAction::Breakpoint),
];

/// Register a listener for every table entry and funnel arrivals into one
/// action channel.
///
/// Registration failures are warnings, not errors: the supervisor keeps
/// starting with whatever subset of the table the platform supports. Must be
/// called on the daemon's runtime before the PID record is published, so no
/// signal addressed to the recorded PID can be lost.
pub fn install_handlers() -> mpsc::Receiver<SignalAction> {
    install_table(SIGNAL_TABLE)
}

fn install_table(table: &[(Signal, SignalAction)]) -> mpsc::Receiver<SignalAction> {
    let (tx, rx) = mpsc::channel(16);

    for &(sig, action) in table {
        let mut stream = match signal(SignalKind::from_raw(sig as libc::c_int)) {
            Ok(stream) => stream,
            Err(e) => {
                warn!(signal = %sig, error = %e, "signal not supported on this platform; handler skipped");
                continue;
            }
        };
        debug!(signal = %sig, action = ?action, "signal handler installed");

        let tx = tx.clone();
        tokio::spawn(async move {
            while stream.recv().await.is_some() {
                if tx.send(action).await.is_err() {
                    // Dispatch loop is gone; stop forwarding.
                    break;
                }
            }
        });
    }

    rx
}
