//! Durable reminder state with actor pattern
//!
//! ReminderStore owns the SQLite database and processes messages via
//! channels, providing thread-safe access to persistent state.

mod db;
mod manager;
mod messages;

pub use db::ReminderDb;
pub use manager::ReminderStore;
pub use messages::{StoreCommand, StoreError, StoreResponse};
