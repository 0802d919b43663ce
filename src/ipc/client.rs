//! IPC client used by the CLI
//!
//! One request per connection: connect, write a line, read a line. The
//! whole round trip runs under a single deadline so a wedged daemon
//! cannot hang the CLI.

use std::path::PathBuf;
use std::time::Duration;

use eyre::{Context, Result, eyre};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tracing::debug;

use crate::domain::{Reminder, ReminderUpdate, ScheduleRequest};

use super::get_socket_path;
use super::messages::{DaemonMessage, DaemonResponse};

/// Deadline for a full request round trip
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Request/response size cap, shared with the listener side
const MAX_MESSAGE_SIZE: usize = 4096;

/// Client side of the daemon's Unix socket protocol
#[derive(Debug, Clone)]
pub struct DaemonClient {
    socket_path: PathBuf,
    timeout: Duration,
}

impl Default for DaemonClient {
    fn default() -> Self {
        Self::new()
    }
}

impl DaemonClient {
    /// Client against the default socket location
    pub fn new() -> Self {
        Self::with_socket_path(get_socket_path())
    }

    /// Client against an explicit socket path
    pub fn with_socket_path(socket_path: PathBuf) -> Self {
        Self {
            socket_path,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Replace the request deadline
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Check whether the daemon's socket file exists
    pub fn socket_exists(&self) -> bool {
        self.socket_path.exists()
    }

    /// Schedule a new reminder
    pub async fn schedule(&self, request: ScheduleRequest) -> Result<Reminder> {
        debug!(task_id = request.task_id, "DaemonClient: schedule");
        reminder_of(self.request(DaemonMessage::Schedule { request }).await?)
    }

    /// Move a scheduled reminder to a new notify time
    pub async fn reschedule(&self, task_id: i64, update: ReminderUpdate) -> Result<Reminder> {
        debug!(task_id, "DaemonClient: reschedule");
        reminder_of(self.request(DaemonMessage::Reschedule { task_id, update }).await?)
    }

    /// Cancel a scheduled reminder
    pub async fn cancel(&self, task_id: i64) -> Result<Reminder> {
        debug!(task_id, "DaemonClient: cancel");
        reminder_of(self.request(DaemonMessage::Cancel { task_id }).await?)
    }

    /// Fetch a single reminder
    pub async fn get(&self, task_id: i64) -> Result<Reminder> {
        debug!(task_id, "DaemonClient: get");
        reminder_of(self.request(DaemonMessage::Get { task_id }).await?)
    }

    /// List scheduled reminders, soonest first
    pub async fn list(&self) -> Result<Vec<Reminder>> {
        debug!("DaemonClient: list");
        match self.request(DaemonMessage::List).await? {
            DaemonResponse::Reminders { reminders } => Ok(reminders),
            other => Err(error_of(other)),
        }
    }

    /// Check the daemon is alive and report its version
    pub async fn ping(&self) -> Result<String> {
        debug!("DaemonClient: ping");
        match self.request(DaemonMessage::Ping).await? {
            DaemonResponse::Pong { version } => Ok(version),
            other => Err(error_of(other)),
        }
    }

    /// Ask the daemon to stop gracefully
    pub async fn shutdown(&self) -> Result<()> {
        debug!("DaemonClient: shutdown");
        match self.request(DaemonMessage::Shutdown).await? {
            DaemonResponse::Ok => Ok(()),
            other => Err(error_of(other)),
        }
    }

    async fn request(&self, msg: DaemonMessage) -> Result<DaemonResponse> {
        debug!(?msg, socket = %self.socket_path.display(), "request: sending");

        let line = serde_json::to_string(&msg).context("Failed to encode request")?;
        if line.len() > MAX_MESSAGE_SIZE {
            return Err(eyre!("Request too large: {} bytes", line.len()));
        }

        let response = tokio::time::timeout(self.timeout, self.round_trip(line))
            .await
            .context("Daemon did not answer within the timeout")??;

        debug!(?response, "request: received");
        Ok(response)
    }

    async fn round_trip(&self, line: String) -> Result<DaemonResponse> {
        let mut stream = UnixStream::connect(&self.socket_path)
            .await
            .context("Failed to connect to daemon socket")?;

        stream
            .write_all(line.as_bytes())
            .await
            .context("Failed to send request")?;
        stream.write_all(b"\n").await.context("Failed to send request")?;
        stream.flush().await.context("Failed to flush request")?;

        let mut reader = BufReader::new(&mut stream);
        let mut reply = String::new();
        let n = reader
            .read_line(&mut reply)
            .await
            .context("Failed to read response")?;
        if n > MAX_MESSAGE_SIZE {
            return Err(eyre!("Response too large: {} bytes", n));
        }

        serde_json::from_str(reply.trim()).context("Failed to decode daemon response")
    }
}

/// Unwrap a single-record response, surfacing daemon errors verbatim
fn reminder_of(response: DaemonResponse) -> Result<Reminder> {
    match response {
        DaemonResponse::Reminder { reminder } => Ok(reminder),
        other => Err(error_of(other)),
    }
}

fn error_of(response: DaemonResponse) -> eyre::Report {
    match response {
        DaemonResponse::Error { message } => eyre!("Daemon error: {}", message),
        other => eyre!("Unexpected daemon response: {:?}", other),
    }
}
