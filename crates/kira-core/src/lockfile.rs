//! Single-instance PID file for the standalone agent daemon.
//!
//! The daemon writes its PID as plain text to `~/.kira/agent.pid` on
//! startup. A second daemon invocation checks the existing file: if the
//! recorded PID is alive and still looks like a `kira` process, startup is
//! refused; otherwise the file is stale and gets overwritten.
//!
//! ## Liveness
//!
//! `kill(pid, 0)` tells us the PID exists, but PIDs get recycled — a crashed
//! daemon's PID could now belong to an unrelated process. On Linux we guard
//! against that by reading `/proc/{pid}/comm` and requiring it to mention
//! `kira`; platforms without `/proc` fall back to the liveness check alone.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    /// Canonical pidfile path: `~/.kira/agent.pid`.
    pub fn path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".kira")
            .join("agent.pid")
    }

    /// Check for a live, same-family daemon and, if none is found, write our
    /// own PID. Returns `Err` with a human-readable message if another
    /// instance is already running.
    pub fn acquire() -> Result<Self, String> {
        let path = Self::path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| e.to_string())?;
        }

        if let Some(existing_pid) = Self::read(&path) {
            if pid_alive(existing_pid) && pid_is_kira(existing_pid) {
                return Err(format!("daemon already running (pid={existing_pid})"));
            }
            tracing::info!(pid = existing_pid, "removing stale agent pidfile");
        }

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .map_err(|e| e.to_string())?;
        write!(file, "{}", std::process::id()).map_err(|e| e.to_string())?;
        file.sync_all().map_err(|e| e.to_string())?;

        Ok(Self { path })
    }

    fn read(path: &PathBuf) -> Option<u32> {
        std::fs::read_to_string(path).ok()?.trim().parse().ok()
    }

    /// Remove the pidfile. Called on clean daemon shutdown.
    pub fn release(self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Check if a process with the given PID is alive.
#[cfg(unix)]
fn pid_alive(pid: u32) -> bool {
    // SAFETY: kill with signal 0 checks existence without sending a signal.
    unsafe { libc::kill(pid as i32, 0) == 0 }
}

#[cfg(not(unix))]
fn pid_alive(_pid: u32) -> bool {
    true
}

/// Best-effort check that `pid` belongs to a `kira` process, so a recycled
/// PID doesn't block startup forever. Conservative: if we can't tell, we
/// assume it does (matches the existing behavior of refusing to start).
#[cfg(target_os = "linux")]
fn pid_is_kira(pid: u32) -> bool {
    match std::fs::read_to_string(format!("/proc/{pid}/comm")) {
        Ok(comm) => comm.to_lowercase().contains("kira"),
        Err(_) => true,
    }
}

#[cfg(not(target_os = "linux"))]
fn pid_is_kira(_pid: u32) -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_pid_is_alive() {
        assert!(pid_alive(std::process::id()));
    }

    #[test]
    fn bogus_pid_is_dead() {
        assert!(!pid_alive(4_000_000));
    }

    #[test]
    fn current_process_counts_as_kira_when_proc_unreadable() {
        // Under non-Linux or in sandboxes without /proc, this degrades to
        // "assume same family" rather than panicking.
        let _ = pid_is_kira(std::process::id());
    }
}
