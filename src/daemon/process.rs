//! Process liveness checks and two-phase termination.

use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Interval between liveness checks while waiting for a process to exit.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Whether `pid` names a live process.
///
/// A process we may not signal (`EPERM`) still exists and counts as alive.
/// "No such process" is the ordinary negative answer, not an error.
#[cfg(unix)]
pub fn is_alive(pid: u32) -> bool {
    let Ok(raw) = libc::pid_t::try_from(pid) else {
        return false;
    };
    if raw <= 0 {
        return false;
    }

    // SAFETY: signal 0 performs only the existence and permission check.
    let alive = if unsafe { libc::kill(raw, 0) } == 0 {
        true
    } else {
        matches!(
            std::io::Error::last_os_error().raw_os_error(),
            Some(libc::EPERM)
        )
    };

    alive && !is_zombie(pid)
}

#[cfg(not(unix))]
pub fn is_alive(_pid: u32) -> bool {
    false
}

/// An exited but unreaped process still answers `kill(pid, 0)`.
#[cfg(target_os = "linux")]
fn is_zombie(pid: u32) -> bool {
    let Ok(stat) = std::fs::read_to_string(format!("/proc/{pid}/stat")) else {
        return false;
    };
    // The command name is parenthesized and may contain spaces; the state
    // field follows the last ')'.
    stat.rsplit_once(')')
        .and_then(|(_, rest)| rest.split_whitespace().next())
        .is_some_and(|state| state == "Z")
}

#[cfg(all(unix, not(target_os = "linux")))]
fn is_zombie(_pid: u32) -> bool {
    false
}

#[cfg(unix)]
#[derive(Debug, Clone, Copy)]
enum Signal {
    Terminate,
    Kill,
}

/// Send `signal`. Returns `false` only when the process is already gone.
#[cfg(unix)]
fn send_signal(pid: u32, signal: Signal) -> bool {
    let Ok(raw) = libc::pid_t::try_from(pid) else {
        return false;
    };
    let signo = match signal {
        Signal::Terminate => libc::SIGTERM,
        Signal::Kill => libc::SIGKILL,
    };

    // SAFETY: plain kill(2) on a positive pid.
    if unsafe { libc::kill(raw, signo) } == 0 {
        return true;
    }
    let err = std::io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::ESRCH) {
        debug!(pid, ?signal, "Process vanished before signal");
        return false;
    }
    warn!(pid, ?signal, error = %err, "Failed to signal process");
    true
}

/// Stop `pid`: SIGTERM, wait up to `timeout` polling every 100ms, then SIGKILL.
///
/// Returns whether the process is confirmed dead afterwards.
#[cfg(unix)]
pub async fn terminate(pid: u32, timeout: Duration) -> bool {
    if !is_alive(pid) {
        return true;
    }

    info!(pid, "Sending SIGTERM");
    if !send_signal(pid, Signal::Terminate) {
        return true;
    }

    let start = Instant::now();
    while start.elapsed() < timeout {
        if !is_alive(pid) {
            debug!(pid, elapsed = ?start.elapsed(), "Process exited after SIGTERM");
            return true;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }

    warn!(pid, ?timeout, "Process ignored SIGTERM, sending SIGKILL");
    if !send_signal(pid, Signal::Kill) {
        return true;
    }

    // SIGKILL delivery is asynchronous; give the kernel a moment to reap.
    for _ in 0..10 {
        if !is_alive(pid) {
            return true;
        }
        tokio::time::sleep(POLL_INTERVAL / 4).await;
    }
    !is_alive(pid)
}

#[cfg(not(unix))]
pub async fn terminate(_pid: u32, _timeout: Duration) -> bool {
    true
}
