//! Process detachment. Must run before the tokio runtime is created: forking
//! a process that already owns runtime threads is undefined behaviour
//! territory, so the supervisor forks first and builds the runtime in the
//! child.

use crate::error::{Result, SupervisorError};
use fork::Fork;

/// Detach from the controlling terminal.
///
/// The parent exits 0 immediately; the child continues in a new session with
/// stdio redirected to /dev/null. The caller is responsible for chdir (the
/// validated working directory is applied separately) and for re-pointing
/// logs at the log file.
pub fn detach() -> Result<()> {
    // nochdir = true: the supervisor chdirs to the validated working
    // directory itself. noclose = false: stdio goes to /dev/null.
    match fork::daemon(true, false) {
        Ok(Fork::Parent(child)) => {
            // The launching shell's job is done once the daemon exists.
            tracing::debug!(child, "daemon forked, parent exiting");
            std::process::exit(0);
        }
        Ok(Fork::Child) => Ok(()),
        Err(errno) => Err(SupervisorError::Daemonize(format!(
            "fork failed with errno {}",
            errno
        ))),
    }
}
