//! Inter-process communication between the CLI and the daemon
//!
//! Newline-delimited JSON over a Unix domain socket. The CLI connects,
//! sends one request line, reads one response line, and disconnects.

use std::path::PathBuf;

pub mod client;
pub mod listener;
pub mod messages;

pub use client::DaemonClient;
pub use listener::{
    cleanup_socket, create_listener, create_listener_at, dispatch_message, read_message, send_response,
};
pub use messages::{DaemonMessage, DaemonResponse};

/// Socket location for daemon IPC
///
/// Prefers the user runtime directory and falls back to the same base
/// directories the other daemon state files use.
pub fn get_socket_path() -> PathBuf {
    let base = dirs::runtime_dir()
        .or_else(dirs::data_local_dir)
        .unwrap_or_else(|| PathBuf::from("/tmp"));
    base.join("remindd").join("daemon.sock")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_socket_path_location() {
        let path = get_socket_path();
        assert!(path.is_absolute());
        assert!(path.ends_with("remindd/daemon.sock"));
    }
}
