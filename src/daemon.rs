//! Daemon process management
//!
//! Tracks the daemon through a PID file and a version file next to it,
//! probes liveness with a signal-0 kill, and spawns or stops the daemon
//! process on behalf of the CLI.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use eyre::{Context, Result};
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use tracing::{debug, info, warn};

use crate::config::DaemonConfig;

/// Version string baked in from git describe at build time
pub const VERSION: &str = env!("GIT_DESCRIBE");

/// How long stop() waits between liveness probes before escalating
const STOP_POLL: std::time::Duration = std::time::Duration::from_millis(100);
const STOP_ATTEMPTS: u32 = 50;

/// Manages the daemon process through its PID and version files
#[derive(Debug)]
pub struct DaemonManager {
    pid_file: PathBuf,
    version_file: PathBuf,
}

impl DaemonManager {
    /// Build a manager on the configured PID file location
    pub fn from_config(config: &DaemonConfig) -> Self {
        Self::with_pid_file(config.pid_file.clone())
    }

    /// Build a manager on an explicit PID file path; the version file
    /// sits alongside it with a .version extension
    pub fn with_pid_file(pid_file: PathBuf) -> Self {
        let version_file = pid_file.with_extension("version");
        debug!(?pid_file, ?version_file, "DaemonManager::with_pid_file: created");
        Self {
            pid_file,
            version_file,
        }
    }

    /// True when the recorded daemon process is alive
    pub fn is_running(&self) -> bool {
        self.running_pid().is_some()
    }

    /// PID of the running daemon, if the recorded process is still alive
    pub fn running_pid(&self) -> Option<u32> {
        let pid = self.read_pid()?;
        if is_process_running(pid) {
            Some(pid)
        } else {
            debug!(pid, "DaemonManager::running_pid: recorded process is dead");
            None
        }
    }

    fn read_pid(&self) -> Option<u32> {
        read_trimmed(&self.pid_file)?.parse().ok()
    }

    /// Version the daemon recorded when it registered
    pub fn read_version(&self) -> Option<String> {
        read_trimmed(&self.version_file)
    }

    /// Check if the running daemon's recorded version matches this binary
    pub fn version_matches(&self) -> bool {
        match self.read_version() {
            Some(daemon_version) => {
                debug!(
                    daemon_version,
                    cli_version = VERSION,
                    "DaemonManager::version_matches: checked"
                );
                daemon_version == VERSION
            }
            // No version file means a daemon too old to write one
            None => false,
        }
    }

    /// Spawn a detached daemon process and record its PID
    ///
    /// The child runs the hidden run-daemon command; the config path is
    /// forwarded so it resolves the same files this process did.
    pub fn start(&self, config_path: Option<&PathBuf>) -> Result<u32> {
        if let Some(pid) = self.running_pid() {
            eyre::bail!("Daemon already running with PID {}", pid);
        }

        let exe = std::env::current_exe().context("Failed to locate the rd executable")?;
        debug!(?exe, "DaemonManager::start: spawning detached daemon");

        let mut command = Command::new(&exe);
        command.arg("run-daemon");
        if let Some(path) = config_path {
            command.arg("--config").arg(path);
        }

        let child = command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .context("Failed to spawn the daemon")?;

        let pid = child.id();
        write_state_file(&self.pid_file, &pid.to_string()).context("Failed to write PID file")?;

        info!(pid, "Daemon started");
        Ok(pid)
    }

    /// Stop the daemon with SIGTERM, escalating to SIGKILL if it hangs
    pub fn stop(&self) -> Result<()> {
        let pid = self
            .running_pid()
            .ok_or_else(|| eyre::eyre!("Daemon is not running"))?;

        debug!(pid, "DaemonManager::stop: asking the daemon to exit");
        kill(Pid::from_raw(pid as i32), Signal::SIGTERM).context("Failed to signal the daemon")?;

        let mut attempts = 0;
        while is_process_running(pid) && attempts < STOP_ATTEMPTS {
            std::thread::sleep(STOP_POLL);
            attempts += 1;
        }
        debug!(pid, attempts, "DaemonManager::stop: waited for exit");

        if is_process_running(pid) {
            warn!(pid, "daemon ignored SIGTERM, escalating to SIGKILL");
            let _ = kill(Pid::from_raw(pid as i32), Signal::SIGKILL);
        }

        self.cleanup_files()?;
        info!(pid, "Daemon stopped");
        Ok(())
    }

    /// Record the current process as the daemon
    ///
    /// Called by the daemon itself once it is up, so the PID file points
    /// at the real daemon even when started in the foreground.
    pub fn register_self(&self) -> Result<()> {
        let pid = std::process::id();
        write_state_file(&self.pid_file, &pid.to_string()).context("Failed to write PID file")?;
        write_state_file(&self.version_file, VERSION).context("Failed to write version file")?;
        info!(pid, version = VERSION, "daemon state files written");
        Ok(())
    }

    /// Remove the PID and version files after the daemon exits
    pub fn cleanup_files(&self) -> Result<()> {
        for path in [&self.pid_file, &self.version_file] {
            if path.exists() {
                fs::remove_file(path)
                    .with_context(|| format!("Failed to remove {}", path.display()))?;
                debug!(?path, "DaemonManager::cleanup_files: removed");
            }
        }
        Ok(())
    }

    /// PID file path
    pub fn pid_file(&self) -> &PathBuf {
        &self.pid_file
    }

    /// Snapshot of the daemon's liveness and recorded version
    pub fn status(&self) -> DaemonStatus {
        let pid = self.running_pid();
        DaemonStatus {
            running: pid.is_some(),
            pid,
            version: self.read_version(),
            pid_file: self.pid_file.clone(),
        }
    }
}

/// Read a small state file, trimming trailing whitespace
fn read_trimmed(path: &Path) -> Option<String> {
    if !path.exists() {
        return None;
    }
    fs::read_to_string(path).ok().map(|s| s.trim().to_string())
}

/// Write a small state file, creating its parent directory first
fn write_state_file(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    fs::write(path, contents).with_context(|| format!("Failed to write {}", path.display()))?;
    debug!(?path, "write_state_file: wrote");
    Ok(())
}

/// Probe a PID with signal 0, which checks existence without touching it
fn is_process_running(pid: u32) -> bool {
    kill(Pid::from_raw(pid as i32), None).is_ok()
}

/// Daemon status information
#[derive(Debug)]
pub struct DaemonStatus {
    pub running: bool,
    pub pid: Option<u32>,
    /// Version the daemon recorded when it registered, if any
    pub version: Option<String>,
    pub pid_file: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn manager_in(temp: &TempDir) -> DaemonManager {
        DaemonManager::with_pid_file(temp.path().join("remindd.pid"))
    }

    #[test]
    fn test_from_config_uses_configured_pid_file() {
        let config = DaemonConfig::default();
        let manager = DaemonManager::from_config(&config);
        assert_eq!(manager.pid_file(), &config.pid_file);
    }

    #[test]
    fn test_version_file_sits_next_to_pid_file() {
        let temp = TempDir::new().unwrap();
        let manager = manager_in(&temp);
        assert_eq!(manager.version_file, temp.path().join("remindd.version"));
    }

    #[test]
    fn test_not_running_without_pid_file() {
        let temp = TempDir::new().unwrap();
        let manager = manager_in(&temp);
        assert!(!manager.is_running());
        assert_eq!(manager.running_pid(), None);
    }

    #[test]
    fn test_own_pid_counts_as_running() {
        let temp = TempDir::new().unwrap();
        let manager = manager_in(&temp);

        write_state_file(manager.pid_file(), &std::process::id().to_string()).unwrap();
        assert!(manager.is_running());
        assert_eq!(manager.running_pid(), Some(std::process::id()));
    }

    #[test]
    fn test_dead_pid_counts_as_stopped() {
        let temp = TempDir::new().unwrap();
        let manager = manager_in(&temp);

        // Far above any real pid_max, so the probe sees ESRCH
        write_state_file(manager.pid_file(), "999999999").unwrap();
        assert!(!manager.is_running());
    }

    #[test]
    fn test_garbage_pid_file_reads_as_stopped() {
        let temp = TempDir::new().unwrap();
        let manager = manager_in(&temp);

        write_state_file(manager.pid_file(), "not-a-pid").unwrap();
        assert!(!manager.is_running());
    }

    #[test]
    fn test_register_self_records_pid_and_version() {
        let temp = TempDir::new().unwrap();
        let manager = manager_in(&temp);

        manager.register_self().unwrap();
        assert_eq!(manager.running_pid(), Some(std::process::id()));
        assert_eq!(manager.read_version(), Some(VERSION.to_string()));
        assert!(manager.version_matches());
    }

    #[test]
    fn test_cleanup_files_removes_both() {
        let temp = TempDir::new().unwrap();
        let manager = manager_in(&temp);

        manager.register_self().unwrap();
        manager.cleanup_files().unwrap();
        assert_eq!(manager.running_pid(), None);
        assert_eq!(manager.read_version(), None);
    }

    #[test]
    fn test_cleanup_files_tolerates_missing_files() {
        let temp = TempDir::new().unwrap();
        let manager = manager_in(&temp);
        manager.cleanup_files().unwrap();
    }

    #[test]
    fn test_version_mismatch_detected() {
        let temp = TempDir::new().unwrap();
        let manager = manager_in(&temp);

        write_state_file(&manager.version_file, "v0.0.0-older").unwrap();
        assert!(!manager.version_matches());
    }

    #[test]
    fn test_missing_version_file_is_a_mismatch() {
        let temp = TempDir::new().unwrap();
        let manager = manager_in(&temp);
        assert!(!manager.version_matches());
    }

    #[test]
    fn test_status_snapshot_when_stopped() {
        let temp = TempDir::new().unwrap();
        let manager = manager_in(&temp);

        let status = manager.status();
        assert!(!status.running);
        assert!(status.pid.is_none());
        assert!(status.version.is_none());
        assert_eq!(status.pid_file, *manager.pid_file());
    }
}
