//! Daemon side of the Unix socket protocol
//!
//! Binds the listener, frames newline-delimited JSON requests, and maps
//! each request onto the dispatch engine.

use std::path::PathBuf;

use eyre::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, warn};

use crate::daemon::VERSION;
use crate::engine::DispatchEngine;

use super::get_socket_path;
use super::messages::{DaemonMessage, DaemonResponse};

/// Maximum message size; matches the client-side cap
const MAX_MESSAGE_SIZE: usize = 4096;

/// Bind the daemon's listener at the default socket location
pub fn create_listener() -> Result<(UnixListener, PathBuf)> {
    let socket_path = get_socket_path();
    create_listener_at(&socket_path)
}

/// Bind a listener at a specific path, replacing any leftover socket file
pub fn create_listener_at(socket_path: &PathBuf) -> Result<(UnixListener, PathBuf)> {
    if let Some(parent) = socket_path.parent() {
        std::fs::create_dir_all(parent).context("Failed to create socket directory")?;
    }

    // A socket file left behind by a dead daemon blocks bind
    if socket_path.exists() {
        debug!(?socket_path, "removing stale socket before bind");
        std::fs::remove_file(socket_path).context("Failed to remove stale socket")?;
    }

    let listener = UnixListener::bind(socket_path).context("Failed to bind IPC socket")?;
    debug!(?socket_path, "IPC socket bound");

    Ok((listener, socket_path.clone()))
}

/// Delete the socket file once the daemon is done with it
pub fn cleanup_socket(socket_path: &PathBuf) {
    if !socket_path.exists() {
        return;
    }
    debug!(?socket_path, "removing socket file");
    if let Err(e) = std::fs::remove_file(socket_path) {
        warn!(?socket_path, error = %e, "Failed to remove socket file");
    }
}

/// Read one request line from a connection
pub async fn read_message(stream: &mut UnixStream) -> Result<DaemonMessage> {
    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    let n = reader
        .read_line(&mut line)
        .await
        .context("Failed to read request line")?;

    if n == 0 {
        return Err(eyre::eyre!("Client closed the connection without a request"));
    }
    if n > MAX_MESSAGE_SIZE {
        return Err(eyre::eyre!("Message too large: {} bytes", n));
    }

    let msg = serde_json::from_str(line.trim()).context("Failed to parse IPC message")?;
    debug!(?msg, "received request");
    Ok(msg)
}

/// Map a single request to a response against the engine
///
/// Store errors cross the boundary as Error responses carrying the
/// store's message verbatim. Shutdown is acknowledged here; actually
/// stopping is the caller's business.
pub async fn dispatch_message(msg: DaemonMessage, engine: &DispatchEngine) -> DaemonResponse {
    match msg {
        DaemonMessage::Schedule { request } => match engine.schedule(request).await {
            Ok(reminder) => DaemonResponse::Reminder { reminder },
            Err(e) => DaemonResponse::Error {
                message: e.to_string(),
            },
        },
        DaemonMessage::Reschedule { task_id, update } => {
            match engine.reschedule(task_id, update).await {
                Ok(reminder) => DaemonResponse::Reminder { reminder },
                Err(e) => DaemonResponse::Error {
                    message: e.to_string(),
                },
            }
        }
        DaemonMessage::Cancel { task_id } => match engine.cancel(task_id).await {
            Ok(reminder) => DaemonResponse::Reminder { reminder },
            Err(e) => DaemonResponse::Error {
                message: e.to_string(),
            },
        },
        DaemonMessage::Get { task_id } => match engine.get(task_id).await {
            Ok(reminder) => DaemonResponse::Reminder { reminder },
            Err(e) => DaemonResponse::Error {
                message: e.to_string(),
            },
        },
        DaemonMessage::List => match engine.list_active().await {
            Ok(reminders) => DaemonResponse::Reminders { reminders },
            Err(e) => DaemonResponse::Error {
                message: e.to_string(),
            },
        },
        DaemonMessage::Ping => DaemonResponse::Pong {
            version: VERSION.to_string(),
        },
        DaemonMessage::Shutdown => DaemonResponse::Ok,
    }
}

/// Write one response line back to the client
pub async fn send_response(stream: &mut UnixStream, response: DaemonResponse) -> Result<()> {
    let mut payload = serde_json::to_string(&response).context("Failed to serialize response")?;
    payload.push('\n');

    stream
        .write_all(payload.as_bytes())
        .await
        .context("Failed to write response")?;
    stream.flush().await.context("Failed to flush response")?;

    debug!(?response, "sent response");
    Ok(())
}
