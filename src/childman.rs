use std::sync::{LazyLock, Mutex};

use nix::errno::Errno;
use nix::sys::signal::{Signal, kill};
use nix::sys::wait::{WaitPidFlag, waitpid};
use nix::unistd::Pid;
use tracing::{debug, warn};

use crate::cmd::process::exit_code;
use crate::errors::{RtResult, RuntimeError};

static CURRENT_CHILD_PID: LazyLock<Mutex<Option<Pid>>> = LazyLock::new(|| Mutex::new(None));
static BACKGROUND_PIDS: LazyLock<Mutex<Vec<Pid>>> = LazyLock::new(|| Mutex::new(Vec::new()));

/// Record the foreground child a signal handler may terminate.
pub fn set_child(pid: Pid) {
    if let Ok(mut current_pid) = CURRENT_CHILD_PID.lock() {
        *current_pid = Some(pid);
    }
}

pub fn clear_child() {
    if let Ok(mut current_pid) = CURRENT_CHILD_PID.lock() {
        *current_pid = None;
    }
}

pub fn current_child() -> Option<Pid> {
    CURRENT_CHILD_PID.lock().ok().and_then(|pid| *pid)
}

/// Send SIGTERM to the foreground child, if any.
pub fn kill_child() -> bool {
    match current_child() {
        Some(pid) => kill(pid, Signal::SIGTERM).is_ok(),
        None => false,
    }
}

pub fn register_background(pids: &[Pid]) {
    if let Ok(mut background) = BACKGROUND_PIDS.lock() {
        background.extend_from_slice(pids);
    }
}

pub fn background_count() -> usize {
    BACKGROUND_PIDS.lock().map_or(0, |bg| bg.len())
}

/// Collect background children that have finished, without blocking.
/// Returns `(pid, status)` for each one reaped.
pub fn reap_background() -> RtResult<Vec<(i32, i32)>> {
    let mut background = BACKGROUND_PIDS
        .lock()
        .map_err(|_| RuntimeError::null_access("background child table poisoned"))?;
    let mut finished = Vec::new();
    let mut still_running = Vec::with_capacity(background.len());
    for pid in background.drain(..) {
        match waitpid(pid, Some(WaitPidFlag::WNOHANG)) {
            Ok(status) => match exit_code(status) {
                Some(code) => {
                    debug!(pid = pid.as_raw(), code, "reaped background child");
                    finished.push((pid.as_raw(), code));
                }
                None => still_running.push(pid),
            },
            Err(Errno::EINTR) => still_running.push(pid),
            Err(errno) => {
                // already collected elsewhere; forget it
                warn!(pid = pid.as_raw(), %errno, "failed to reap background child");
            }
        }
    }
    *background = still_running;
    Ok(finished)
}
