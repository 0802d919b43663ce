//! Reminder store messages
//!
//! Commands and responses for the actor pattern.

use thiserror::Error;
use tokio::sync::oneshot;

use crate::domain::{Reminder, ReminderUpdate, ScheduleRequest};

/// Errors from store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Reminder not found for task {0}")]
    NotFound(i64),

    #[error("A reminder already exists for task {0}")]
    DuplicateTask(i64),

    #[error("Notification time must be in the future")]
    InvalidNotifyTime,

    #[error("Title must not be empty")]
    InvalidTitle,

    #[error("Store error: {0}")]
    Db(String),

    #[error("Channel error")]
    ChannelError,
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Db(e.to_string())
    }
}

/// Response from store operations
pub type StoreResponse<T> = Result<T, StoreError>;

/// Commands sent to the ReminderStore actor
#[derive(Debug)]
pub enum StoreCommand {
    Create {
        request: ScheduleRequest,
        reply: oneshot::Sender<StoreResponse<Reminder>>,
    },
    Get {
        task_id: i64,
        reply: oneshot::Sender<StoreResponse<Reminder>>,
    },
    Update {
        task_id: i64,
        update: ReminderUpdate,
        reply: oneshot::Sender<StoreResponse<Reminder>>,
    },
    Cancel {
        task_id: i64,
        reply: oneshot::Sender<StoreResponse<Reminder>>,
    },
    MarkDispatched {
        task_id: i64,
        version: i64,
        reply: oneshot::Sender<StoreResponse<bool>>,
    },
    ListActive {
        reply: oneshot::Sender<StoreResponse<Vec<Reminder>>>,
    },

    // Shutdown
    Shutdown,
}
