//! Reminder record and lifecycle states
//!
//! Reminder is the sole persisted entity. `notify_time` is the single
//! scheduling input; `due_date` and `priority` ride along for display only.
//! `version` increments on every reschedule and is what makes a stale timer
//! firing detectable.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::priority::Priority;

/// Lifecycle state of a reminder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReminderStatus {
    /// Armed and waiting to fire
    #[default]
    Scheduled,
    /// Delivered exactly once (terminal)
    Dispatched,
    /// Explicitly canceled before firing (terminal)
    Canceled,
}

impl ReminderStatus {
    /// Check if no further transitions are permitted out of this state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Dispatched | Self::Canceled)
    }
}

impl std::fmt::Display for ReminderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Scheduled => write!(f, "scheduled"),
            Self::Dispatched => write!(f, "dispatched"),
            Self::Canceled => write!(f, "canceled"),
        }
    }
}

impl std::str::FromStr for ReminderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(Self::Scheduled),
            "dispatched" => Ok(Self::Dispatched),
            "canceled" => Ok(Self::Canceled),
            _ => Err(format!("Unknown reminder status: {}", s)),
        }
    }
}

/// A reminder tied to an externally identified task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reminder {
    /// Caller-supplied task identifier, unique across non-canceled records
    pub task_id: i64,

    /// Short text carried through to delivery
    pub title: String,

    /// Calendar date of the underlying task (informational)
    pub due_date: NaiveDate,

    /// Informational priority label
    pub priority: Priority,

    /// Absolute fire time; the single scheduling input
    pub notify_time: DateTime<Utc>,

    /// Incremented on every reschedule; guards against stale firings
    pub version: i64,

    /// Current lifecycle state
    pub status: ReminderStatus,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last mutation timestamp
    pub updated_at: DateTime<Utc>,
}

impl Reminder {
    /// Create a fresh Scheduled reminder at version 1
    pub fn new(
        task_id: i64,
        title: impl Into<String>,
        due_date: NaiveDate,
        priority: Priority,
        notify_time: DateTime<Utc>,
    ) -> Self {
        let now = Utc::now();
        Self {
            task_id,
            title: title.into(),
            due_date,
            priority,
            notify_time,
            version: 1,
            status: ReminderStatus::Scheduled,
            created_at: now,
            updated_at: now,
        }
    }

    /// Update the status
    pub fn set_status(&mut self, status: ReminderStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }

    /// Check if the record is in a terminal state
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Check if the fire time has already passed relative to `now`
    pub fn is_past_due(&self, now: DateTime<Utc>) -> bool {
        self.notify_time <= now
    }
}

/// Payload for creating a reminder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleRequest {
    pub task_id: i64,
    pub title: String,
    pub due_date: NaiveDate,
    #[serde(default)]
    pub priority: Priority,
    pub notify_time: DateTime<Utc>,
}

/// Payload for rescheduling; `notify_time` is always required, the rest
/// keep their current values when absent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderUpdate {
    pub notify_time: DateTime<Utc>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub priority: Option<Priority>,
}

impl ReminderUpdate {
    /// An update that only moves the fire time
    pub fn at(notify_time: DateTime<Utc>) -> Self {
        Self {
            notify_time,
            title: None,
            due_date: None,
            priority: None,
        }
    }

    /// Set a replacement title
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Set a replacement priority
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Set a replacement due date
    pub fn with_due_date(mut self, due_date: NaiveDate) -> Self {
        self.due_date = Some(due_date);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample(task_id: i64) -> Reminder {
        Reminder::new(
            task_id,
            "Team Meeting",
            NaiveDate::from_ymd_opt(2025, 2, 25).unwrap(),
            Priority::High,
            Utc::now() + Duration::hours(1),
        )
    }

    #[test]
    fn test_new_reminder_defaults() {
        let reminder = sample(1);
        assert_eq!(reminder.task_id, 1);
        assert_eq!(reminder.title, "Team Meeting");
        assert_eq!(reminder.version, 1);
        assert_eq!(reminder.status, ReminderStatus::Scheduled);
        assert!(!reminder.is_terminal());
    }

    #[test]
    fn test_terminal_states() {
        let mut reminder = sample(1);
        assert!(!reminder.is_terminal());

        reminder.set_status(ReminderStatus::Dispatched);
        assert!(reminder.is_terminal());

        reminder.set_status(ReminderStatus::Canceled);
        assert!(reminder.is_terminal());
    }

    #[test]
    fn test_is_past_due() {
        let mut reminder = sample(1);
        let now = Utc::now();
        assert!(!reminder.is_past_due(now));

        reminder.notify_time = now - Duration::minutes(5);
        assert!(reminder.is_past_due(now));

        // Boundary: exactly-now counts as past due
        reminder.notify_time = now;
        assert!(reminder.is_past_due(now));
    }

    #[test]
    fn test_status_display_parse_roundtrip() {
        for status in [
            ReminderStatus::Scheduled,
            ReminderStatus::Dispatched,
            ReminderStatus::Canceled,
        ] {
            let parsed: ReminderStatus = status.to_string().parse().unwrap();
            assert_eq!(parsed, status);
        }
        assert!("done".parse::<ReminderStatus>().is_err());
    }

    #[test]
    fn test_reminder_serde() {
        let reminder = sample(42);
        let json = serde_json::to_string(&reminder).unwrap();
        let back: Reminder = serde_json::from_str(&json).unwrap();

        assert_eq!(back.task_id, reminder.task_id);
        assert_eq!(back.title, reminder.title);
        assert_eq!(back.due_date, reminder.due_date);
        assert_eq!(back.notify_time, reminder.notify_time);
        assert_eq!(back.status, reminder.status);
    }

    #[test]
    fn test_update_builder() {
        let at = Utc::now() + Duration::minutes(30);
        let update = ReminderUpdate::at(at)
            .with_title("Updated Meeting")
            .with_priority(Priority::Medium);

        assert_eq!(update.notify_time, at);
        assert_eq!(update.title.as_deref(), Some("Updated Meeting"));
        assert_eq!(update.priority, Some(Priority::Medium));
        assert!(update.due_date.is_none());
    }
}
