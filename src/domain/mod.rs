//! Domain types for remindd
//!
//! Core domain types: Reminder plus its status/priority enums and the
//! request payloads the engine accepts.

mod priority;
mod reminder;

pub use priority::Priority;
pub use reminder::{Reminder, ReminderStatus, ReminderUpdate, ScheduleRequest};
