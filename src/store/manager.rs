//! ReminderStore - actor that owns the SQLite database
//!
//! Processes commands via channels for thread-safe access to persistent
//! state. The actor serializes every mutation, so create/update/cancel/
//! mark-dispatched for the same task_id can never interleave.

use std::path::Path;

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::domain::{Reminder, ReminderUpdate, ScheduleRequest};

use super::db::ReminderDb;
use super::messages::{StoreCommand, StoreError, StoreResponse};

/// Handle to send commands to the store actor
#[derive(Clone)]
pub struct ReminderStore {
    tx: mpsc::Sender<StoreCommand>,
}

impl ReminderStore {
    /// Spawn a store actor backed by the database file at `db_path`
    pub fn spawn(db_path: impl AsRef<Path>) -> eyre::Result<Self> {
        debug!(db_path = %db_path.as_ref().display(), "spawn: called");
        let db = ReminderDb::open(db_path.as_ref())?;

        let (tx, rx) = mpsc::channel(256);
        tokio::spawn(actor_loop(db, rx));

        info!("ReminderStore spawned");
        Ok(Self { tx })
    }

    /// Spawn a store actor over an in-memory database (for tests)
    pub fn spawn_in_memory() -> eyre::Result<Self> {
        debug!("spawn_in_memory: called");
        let db = ReminderDb::in_memory()?;

        let (tx, rx) = mpsc::channel(256);
        tokio::spawn(actor_loop(db, rx));

        Ok(Self { tx })
    }

    /// Create a fresh Scheduled reminder
    pub async fn create(&self, request: ScheduleRequest) -> StoreResponse<Reminder> {
        debug!(task_id = %request.task_id, notify_time = %request.notify_time, "create: called");
        let (reply_tx, reply_rx) = tokio::sync::oneshot::channel();
        self.tx
            .send(StoreCommand::Create {
                request,
                reply: reply_tx,
            })
            .await
            .map_err(|_| StoreError::ChannelError)?;
        reply_rx.await.map_err(|_| StoreError::ChannelError)?
    }

    /// Get a reminder by task_id
    pub async fn get(&self, task_id: i64) -> StoreResponse<Reminder> {
        debug!(%task_id, "get: called");
        let (reply_tx, reply_rx) = tokio::sync::oneshot::channel();
        self.tx
            .send(StoreCommand::Get {
                task_id,
                reply: reply_tx,
            })
            .await
            .map_err(|_| StoreError::ChannelError)?;
        reply_rx.await.map_err(|_| StoreError::ChannelError)?
    }

    /// Update a Scheduled reminder, bumping its version
    pub async fn update(&self, task_id: i64, update: ReminderUpdate) -> StoreResponse<Reminder> {
        debug!(%task_id, notify_time = %update.notify_time, "update: called");
        let (reply_tx, reply_rx) = tokio::sync::oneshot::channel();
        self.tx
            .send(StoreCommand::Update {
                task_id,
                update,
                reply: reply_tx,
            })
            .await
            .map_err(|_| StoreError::ChannelError)?;
        reply_rx.await.map_err(|_| StoreError::ChannelError)?
    }

    /// Cancel a Scheduled reminder
    pub async fn cancel(&self, task_id: i64) -> StoreResponse<Reminder> {
        debug!(%task_id, "cancel: called");
        let (reply_tx, reply_rx) = tokio::sync::oneshot::channel();
        self.tx
            .send(StoreCommand::Cancel {
                task_id,
                reply: reply_tx,
            })
            .await
            .map_err(|_| StoreError::ChannelError)?;
        reply_rx.await.map_err(|_| StoreError::ChannelError)?
    }

    /// Compare-and-set transition to Dispatched; false means the firing
    /// was stale and nothing changed
    pub async fn mark_dispatched(&self, task_id: i64, version: i64) -> StoreResponse<bool> {
        debug!(%task_id, %version, "mark_dispatched: called");
        let (reply_tx, reply_rx) = tokio::sync::oneshot::channel();
        self.tx
            .send(StoreCommand::MarkDispatched {
                task_id,
                version,
                reply: reply_tx,
            })
            .await
            .map_err(|_| StoreError::ChannelError)?;
        reply_rx.await.map_err(|_| StoreError::ChannelError)?
    }

    /// List all Scheduled reminders, soonest first
    pub async fn list_active(&self) -> StoreResponse<Vec<Reminder>> {
        debug!("list_active: called");
        let (reply_tx, reply_rx) = tokio::sync::oneshot::channel();
        self.tx
            .send(StoreCommand::ListActive { reply: reply_tx })
            .await
            .map_err(|_| StoreError::ChannelError)?;
        reply_rx.await.map_err(|_| StoreError::ChannelError)?
    }

    /// Shutdown the store actor
    pub async fn shutdown(&self) -> Result<(), StoreError> {
        debug!("shutdown: called");
        self.tx
            .send(StoreCommand::Shutdown)
            .await
            .map_err(|_| StoreError::ChannelError)
    }
}

/// The actor loop that owns the database and processes commands
async fn actor_loop(db: ReminderDb, mut rx: mpsc::Receiver<StoreCommand>) {
    debug!("ReminderStore actor started");

    while let Some(cmd) = rx.recv().await {
        match cmd {
            StoreCommand::Create { request, reply } => {
                debug!(task_id = %request.task_id, "actor_loop: Create command");
                let _ = reply.send(db.create(request));
            }

            StoreCommand::Get { task_id, reply } => {
                debug!(%task_id, "actor_loop: Get command");
                let _ = reply.send(db.get(task_id));
            }

            StoreCommand::Update {
                task_id,
                update,
                reply,
            } => {
                debug!(%task_id, "actor_loop: Update command");
                let _ = reply.send(db.update(task_id, update));
            }

            StoreCommand::Cancel { task_id, reply } => {
                debug!(%task_id, "actor_loop: Cancel command");
                let _ = reply.send(db.cancel(task_id));
            }

            StoreCommand::MarkDispatched {
                task_id,
                version,
                reply,
            } => {
                debug!(%task_id, %version, "actor_loop: MarkDispatched command");
                let _ = reply.send(db.mark_dispatched(task_id, version));
            }

            StoreCommand::ListActive { reply } => {
                debug!("actor_loop: ListActive command");
                let _ = reply.send(db.list_active());
            }

            StoreCommand::Shutdown => {
                debug!("actor_loop: Shutdown command");
                info!("ReminderStore shutting down");
                break;
            }
        }
    }

    debug!("ReminderStore actor stopped");
}
