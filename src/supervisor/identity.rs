//! Privilege drop: assume a least-privilege user/group before the worker runs.
//!
//! Fail-closed: any resolution or syscall failure aborts the start. The
//! worker loop must never run under an identity the operator did not ask for.

use crate::error::{Result, SupervisorError};
use nix::unistd::{getegid, geteuid, initgroups, setgid, setuid, Group, User};
use std::ffi::CString;
use tracing::{debug, info};

/// Switch the effective user/group to the named identities.
///
/// Group is applied first so the user change cannot strip the privilege
/// needed for setgid. When a user is given, supplementary groups are
/// initialized from the passwd database before setuid. Each change is
/// skipped when unset or already matching the current effective identity.
pub fn drop_privileges(user: Option<&str>, group: Option<&str>) -> Result<()> {
    if user.is_none() && group.is_none() {
        return Ok(());
    }

    let target_user = match user {
        Some(name) => Some(resolve_user(name)?),
        None => None,
    };
    let target_group = match group {
        Some(name) => Some(resolve_group(name)?),
        None => None,
    };

    if let Some(ref grp) = target_group {
        if grp.gid != getegid() {
            setgid(grp.gid).map_err(|e| SupervisorError::PrivilegeChange(format!(
                "cannot switch to group '{}' (gid {}): {}",
                grp.name, grp.gid, e
            )))?;
            info!(group = %grp.name, gid = %grp.gid, "group identity changed");
        } else {
            debug!(group = %grp.name, "already running as requested group");
        }
    }

    if let Some(ref usr) = target_user {
        if usr.uid != geteuid() {
            let name = CString::new(usr.name.as_str()).map_err(|_| {
                SupervisorError::PrivilegeChange(format!(
                    "user name '{}' contains a NUL byte",
                    usr.name
                ))
            })?;
            let gid = target_group.as_ref().map(|g| g.gid).unwrap_or(usr.gid);
            initgroups(&name, gid).map_err(|e| SupervisorError::PrivilegeChange(format!(
                "cannot initialize supplementary groups for '{}': {}",
                usr.name, e
            )))?;
            setuid(usr.uid).map_err(|e| SupervisorError::PrivilegeChange(format!(
                "cannot switch to user '{}' (uid {}): {}",
                usr.name, usr.uid, e
            )))?;
            info!(user = %usr.name, uid = %usr.uid, "user identity changed");
        } else {
            debug!(user = %usr.name, "already running as requested user");
        }
    }

    Ok(())
}

/// Resolve both names without changing identity.
///
/// Resolution is side-effect-free, so the invoking process can reject an
/// unknown user or group before any fork, while the error can still reach
/// the terminal with a non-zero exit.
pub fn verify(user: Option<&str>, group: Option<&str>) -> Result<()> {
    if let Some(name) = user {
        resolve_user(name)?;
    }
    if let Some(name) = group {
        resolve_group(name)?;
    }
    Ok(())
}

fn resolve_user(name: &str) -> Result<User> {
    User::from_name(name)
        .map_err(|e| SupervisorError::PrivilegeChange(format!("cannot look up user '{}': {}", name, e)))?
        .ok_or_else(|| SupervisorError::PrivilegeChange(format!("unknown user '{}'", name)))
}

fn resolve_group(name: &str) -> Result<Group> {
    Group::from_name(name)
        .map_err(|e| SupervisorError::PrivilegeChange(format!("cannot look up group '{}': {}", name, e)))?
        .ok_or_else(|| SupervisorError::PrivilegeChange(format!("unknown group '{}'", name)))
}
