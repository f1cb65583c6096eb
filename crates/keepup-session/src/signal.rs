//! Process liveness and termination via `kill(2)`.
//!
//! # Panic-Free Guarantees
//!
//! Pids that would address a process group (0, or anything past `i32::MAX`)
//! are rejected before any syscall is made.

use crate::launcher::LaunchError;

fn as_target(pid: u32) -> Option<libc::pid_t> {
    match libc::pid_t::try_from(pid) {
        Ok(p) if p > 0 => Some(p),
        _ => None,
    }
}

/// Returns true if a process with this pid exists.
///
/// A process owned by another user still counts as alive (`EPERM`).
pub fn pid_alive(pid: u32) -> bool {
    let Some(target) = as_target(pid) else {
        return false;
    };

    // SAFETY: signal 0 performs only the existence and permission check.
    let result = unsafe { libc::kill(target, 0) };
    if result == 0 {
        return true;
    }

    std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

/// Sends SIGTERM to the process.
pub fn send_terminate(pid: u32) -> Result<(), LaunchError> {
    let target = as_target(pid).ok_or(LaunchError::InvalidPid(pid))?;

    // SAFETY: target is a single positive pid.
    let result = unsafe { libc::kill(target, libc::SIGTERM) };
    if result == 0 {
        Ok(())
    } else {
        Err(LaunchError::Signal {
            pid,
            source: std::io::Error::last_os_error(),
        })
    }
}
