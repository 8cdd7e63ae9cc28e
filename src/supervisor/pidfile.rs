//! Plain-text PID record: the only state shared across invocations.
//!
//! The file holds one decimal PID and a trailing newline. There is no lock
//! around it; one supervisor per path is assumed, and a `stop` racing a
//! concurrent `start` on the same path has undefined outcome.

use crate::error::{Result, SupervisorError};
use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::Pid;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Persist `pid`, creating parent directories as needed.
    pub fn write(&self, pid: u32) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, format!("{}\n", pid))?;
        debug!(path = %self.path.display(), pid, "PID file written");
        Ok(())
    }

    /// Read the recorded PID. `Ok(None)` when no record exists; a record
    /// that is present but unparsable is an error, not a silent miss.
    pub fn read(&self) -> Result<Option<u32>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let pid = content
            .trim()
            .parse::<u32>()
            .map_err(|e| SupervisorError::PidFile {
                path: self.path.display().to_string(),
                reason: e.to_string(),
            })?;
        // Kernel PIDs are positive i32s. Anything else as a raw kill()
        // argument would address a process group, not a process.
        if pid == 0 || pid > i32::MAX as u32 {
            return Err(SupervisorError::PidFile {
                path: self.path.display().to_string(),
                reason: format!("{} is not a valid PID", pid),
            });
        }
        Ok(Some(pid))
    }

    /// Delete the record. Missing file is not an error.
    pub fn remove(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                debug!(path = %self.path.display(), "PID file removed");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Return the recorded PID if it names a live process.
    pub fn running_pid(&self) -> Result<Option<u32>> {
        match self.read()? {
            Some(pid) if process_exists(pid) => Ok(Some(pid)),
            _ => Ok(None),
        }
    }
}

/// Probe a PID for existence with a null signal.
///
/// EPERM means the process exists but belongs to someone else, which still
/// counts as running.
pub fn process_exists(pid: u32) -> bool {
    let raw = match i32::try_from(pid) {
        Ok(raw) => raw,
        // Would wrap negative and probe a process group instead.
        Err(_) => return false,
    };
    match kill(Pid::from_raw(raw), None) {
        Ok(()) => true,
        Err(Errno::EPERM) => true,
        Err(e) => {
            trace!(pid, errno = %e, "PID existence probe");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // A PID that is all but guaranteed not to exist; kill(pid, 0) reports
    // ESRCH for it on any reasonably configured system.
    const DEAD_PID: u32 = 99999;

    fn pid_file_in(dir: &tempfile::TempDir) -> PidFile {
        PidFile::new(dir.path().join("q.pid"))
    }

    #[test]
    fn test_write_read_remove_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let pf = pid_file_in(&dir);

        assert!(!pf.exists());
        pf.write(12345).unwrap();
        assert!(pf.exists());
        assert_eq!(pf.read().unwrap(), Some(12345));

        let raw = std::fs::read_to_string(pf.path()).unwrap();
        assert_eq!(raw, "12345\n");

        pf.remove().unwrap();
        assert!(!pf.exists());
        assert_eq!(pf.read().unwrap(), None);
    }

    #[test]
    fn test_remove_missing_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        pid_file_in(&dir).remove().unwrap();
    }

    #[test]
    fn test_write_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let pf = PidFile::new(dir.path().join("deep/run/q.pid"));
        pf.write(1).unwrap();
        assert_eq!(pf.read().unwrap(), Some(1));
    }

    #[test]
    fn test_garbage_record_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let pf = pid_file_in(&dir);
        std::fs::write(pf.path(), "not-a-pid\n").unwrap();
        let err = pf.read().unwrap_err();
        assert!(matches!(err, SupervisorError::PidFile { .. }));
    }

    #[test]
    fn test_out_of_range_record_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let pf = pid_file_in(&dir);

        // u32::MAX would wrap to -1 as a raw kill() target, signalling
        // every process the caller may signal; zero addresses the whole
        // process group.
        for bad in ["0\n", "2147483648\n", "4294967295\n"] {
            std::fs::write(pf.path(), bad).unwrap();
            let err = pf.read().unwrap_err();
            assert!(matches!(err, SupervisorError::PidFile { .. }), "{bad:?}");
        }
    }

    #[test]
    fn test_process_exists_for_self_and_not_for_dead_pid() {
        assert!(process_exists(std::process::id()));
        assert!(!process_exists(DEAD_PID));
        assert!(!process_exists(u32::MAX));
    }

    #[test]
    fn test_running_pid_filters_dead_processes() {
        let dir = tempfile::tempdir().unwrap();
        let pf = pid_file_in(&dir);

        pf.write(DEAD_PID).unwrap();
        assert_eq!(pf.running_pid().unwrap(), None);

        pf.write(std::process::id()).unwrap();
        assert_eq!(pf.running_pid().unwrap(), Some(std::process::id()));
    }
}
