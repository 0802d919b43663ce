//! Notification delivery
//!
//! The dispatch engine only needs a delivery contract; what a delivery
//! physically is (a log line today, a desktop popup or webhook later)
//! stays behind the `Notifier` trait.

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

/// Errors from a delivery attempt
#[derive(Debug, Error)]
pub enum NotifyError {
    /// The delivery channel reported a failure
    #[error("Delivery failed: {0}")]
    DeliveryFailed(String),
}

/// Delivery channel for due reminders
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver a notification for a due reminder
    async fn deliver(&self, task_id: i64, title: &str) -> Result<(), NotifyError>;
}

/// Notifier that emits the reminder as a log line
///
/// This is the default channel for the daemon. The emitted line is the
/// user-visible notification, so it logs at info level unconditionally.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn deliver(&self, task_id: i64, title: &str) -> Result<(), NotifyError> {
        info!("Reminder for task {}: {}", task_id, title);
        Ok(())
    }
}
