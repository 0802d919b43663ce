//! Scheduling and delivery
//!
//! DispatchEngine ties the durable store to the in-memory timer registry
//! and delivers due reminders through a Notifier, at most once per
//! record version.

mod dispatch;
pub mod notifier;
mod recovery;

pub use dispatch::DispatchEngine;
pub use notifier::{LogNotifier, Notifier, NotifyError};
pub use recovery::{RecoveryStats, recover};
