//! remindd - task reminder daemon
//!
//! remindd schedules reminders for tasks and delivers a notification when
//! each one falls due. A long-running daemon owns the armed timers and the
//! durable store; the `rd` CLI talks to it over a Unix socket.
//!
//! # Core Concepts
//!
//! - **Durable First**: Every reminder persists to SQLite before a timer arms
//! - **Version Guard**: Each firing carries the version it was armed with, so
//!   a reschedule or cancel silently invalidates in-flight timers
//! - **At-Most-Once**: A compare-and-swap on (task, version) marks dispatch,
//!   so overlapping firings deliver a reminder exactly once or not at all
//! - **Recovery on Start**: Scheduled reminders re-arm from the store, and
//!   past-due ones fire immediately
//!
//! # Modules
//!
//! - [`domain`] - Reminder records, priorities, and status transitions
//! - [`store`] - SQLite-backed reminder store behind an actor handle
//! - [`timer`] - In-memory registry of armed tokio timers
//! - [`engine`] - Dispatch orchestration, delivery, and startup recovery
//! - [`ipc`] - Unix socket protocol between CLI and daemon
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod cli;
pub mod config;
pub mod daemon;
pub mod domain;
pub mod engine;
pub mod ipc;
pub mod store;
pub mod timer;

// Re-export commonly used types
pub use config::{Config, DaemonConfig, DispatchConfig, StoreConfig};
pub use domain::{Priority, Reminder, ReminderStatus, ReminderUpdate, ScheduleRequest};
pub use engine::{DispatchEngine, LogNotifier, Notifier, NotifyError, RecoveryStats, recover};
pub use ipc::{DaemonClient, DaemonMessage, DaemonResponse};
pub use store::{ReminderStore, StoreError};
pub use timer::TimerRegistry;
