//! SQLite persistence for reminder records
//!
//! One row per task_id; canceled rows are kept as tombstones that every
//! read path treats as removed. All access goes through the store actor,
//! which serializes mutations.

use std::path::Path;

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::debug;

use crate::domain::{Reminder, ReminderStatus, ReminderUpdate, ScheduleRequest};

use super::messages::StoreError;

/// SQLite-backed reminder store
pub struct ReminderDb {
    conn: Connection,
}

impl ReminderDb {
    /// Open (or create) the database file at `db_path`
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Db(e.to_string()))?;
        }
        let conn = Connection::open(db_path)?;
        Self::create_schema(&conn)?;
        debug!(db_path = %db_path.display(), "ReminderDb opened");
        Ok(Self { conn })
    }

    /// Create an in-memory database (for tests)
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::create_schema(&conn)?;
        Ok(Self { conn })
    }

    fn create_schema(conn: &Connection) -> rusqlite::Result<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS reminders (
                task_id INTEGER PRIMARY KEY,
                title TEXT NOT NULL,
                due_date TEXT NOT NULL,
                priority TEXT NOT NULL,
                notify_time TEXT NOT NULL,
                version INTEGER NOT NULL DEFAULT 1,
                status TEXT NOT NULL DEFAULT 'scheduled',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_reminders_status_notify
                ON reminders(status, notify_time ASC);",
        )
    }

    /// Insert a fresh Scheduled record at version 1
    ///
    /// Fails if a Scheduled or Dispatched record already holds the task_id;
    /// a canceled tombstone is replaced.
    pub fn create(&self, request: ScheduleRequest) -> Result<Reminder, StoreError> {
        if request.title.trim().is_empty() {
            return Err(StoreError::InvalidTitle);
        }
        if request.notify_time <= Utc::now() {
            return Err(StoreError::InvalidNotifyTime);
        }

        let existing: Option<String> = self
            .conn
            .query_row(
                "SELECT status FROM reminders WHERE task_id = ?1",
                params![request.task_id],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(status) = existing {
            if status != ReminderStatus::Canceled.to_string() {
                return Err(StoreError::DuplicateTask(request.task_id));
            }
        }

        let reminder = Reminder::new(
            request.task_id,
            request.title,
            request.due_date,
            request.priority,
            request.notify_time,
        );

        self.conn.execute(
            "INSERT OR REPLACE INTO reminders
                (task_id, title, due_date, priority, notify_time, version, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                reminder.task_id,
                reminder.title,
                reminder.due_date.to_string(),
                reminder.priority.to_string(),
                reminder.notify_time.to_rfc3339(),
                reminder.version,
                reminder.status.to_string(),
                reminder.created_at.to_rfc3339(),
                reminder.updated_at.to_rfc3339(),
            ],
        )?;

        Ok(reminder)
    }

    /// Look up a record; canceled tombstones read as NotFound
    pub fn get(&self, task_id: i64) -> Result<Reminder, StoreError> {
        let reminder = self.fetch(task_id)?.ok_or(StoreError::NotFound(task_id))?;
        if reminder.status == ReminderStatus::Canceled {
            return Err(StoreError::NotFound(task_id));
        }
        Ok(reminder)
    }

    /// Apply an update to a Scheduled record, bumping its version
    pub fn update(&self, task_id: i64, update: ReminderUpdate) -> Result<Reminder, StoreError> {
        let current = self.get(task_id)?;
        if current.status != ReminderStatus::Scheduled {
            return Err(StoreError::NotFound(task_id));
        }
        if let Some(title) = &update.title {
            if title.trim().is_empty() {
                return Err(StoreError::InvalidTitle);
            }
        }
        if update.notify_time <= Utc::now() {
            return Err(StoreError::InvalidNotifyTime);
        }

        let title = update.title.unwrap_or(current.title);
        let due_date = update.due_date.unwrap_or(current.due_date);
        let priority = update.priority.unwrap_or(current.priority);

        let affected = self.conn.execute(
            "UPDATE reminders
             SET title = ?2, due_date = ?3, priority = ?4, notify_time = ?5,
                 version = version + 1, updated_at = ?6
             WHERE task_id = ?1 AND status = 'scheduled'",
            params![
                task_id,
                title,
                due_date.to_string(),
                priority.to_string(),
                update.notify_time.to_rfc3339(),
                Utc::now().to_rfc3339(),
            ],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound(task_id));
        }

        self.get(task_id)
    }

    /// Transition a Scheduled record to Canceled
    ///
    /// A second cancel sees the tombstone and reports NotFound.
    pub fn cancel(&self, task_id: i64) -> Result<Reminder, StoreError> {
        let affected = self.conn.execute(
            "UPDATE reminders SET status = 'canceled', updated_at = ?2
             WHERE task_id = ?1 AND status = 'scheduled'",
            params![task_id, Utc::now().to_rfc3339()],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound(task_id));
        }

        self.fetch(task_id)?.ok_or(StoreError::NotFound(task_id))
    }

    /// Compare-and-set transition to Dispatched
    ///
    /// Applies only while the stored version matches and the record is still
    /// Scheduled; returns false otherwise (stale firing, already terminal).
    pub fn mark_dispatched(&self, task_id: i64, version: i64) -> Result<bool, StoreError> {
        let affected = self.conn.execute(
            "UPDATE reminders SET status = 'dispatched', updated_at = ?3
             WHERE task_id = ?1 AND version = ?2 AND status = 'scheduled'",
            params![task_id, version, Utc::now().to_rfc3339()],
        )?;
        Ok(affected == 1)
    }

    /// All Scheduled records, soonest first
    pub fn list_active(&self) -> Result<Vec<Reminder>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT task_id, title, due_date, priority, notify_time, version, status, created_at, updated_at
             FROM reminders WHERE status = 'scheduled' ORDER BY notify_time ASC",
        )?;
        let rows = stmt.query_map([], row_to_reminder)?;
        let mut reminders = Vec::new();
        for row in rows {
            reminders.push(row?);
        }
        Ok(reminders)
    }

    fn fetch(&self, task_id: i64) -> Result<Option<Reminder>, StoreError> {
        let reminder = self
            .conn
            .query_row(
                "SELECT task_id, title, due_date, priority, notify_time, version, status, created_at, updated_at
                 FROM reminders WHERE task_id = ?1",
                params![task_id],
                row_to_reminder,
            )
            .optional()?;
        Ok(reminder)
    }
}

fn row_to_reminder(row: &Row<'_>) -> rusqlite::Result<Reminder> {
    let due_date: String = row.get(2)?;
    let priority: String = row.get(3)?;
    let notify_time: String = row.get(4)?;
    let status: String = row.get(6)?;
    let created_at: String = row.get(7)?;
    let updated_at: String = row.get(8)?;

    Ok(Reminder {
        task_id: row.get(0)?,
        title: row.get(1)?,
        due_date: NaiveDate::parse_from_str(&due_date, "%Y-%m-%d")
            .map_err(|e| text_conversion_err(2, Box::new(e)))?,
        priority: priority
            .parse()
            .map_err(|e: String| text_conversion_err(3, e.into()))?,
        notify_time: parse_timestamp(4, &notify_time)?,
        version: row.get(5)?,
        status: status
            .parse()
            .map_err(|e: String| text_conversion_err(6, e.into()))?,
        created_at: parse_timestamp(7, &created_at)?,
        updated_at: parse_timestamp(8, &updated_at)?,
    })
}

fn parse_timestamp(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| text_conversion_err(idx, Box::new(e)))
}

fn text_conversion_err(
    idx: usize,
    e: Box<dyn std::error::Error + Send + Sync + 'static>,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, e)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::domain::Priority;
    use chrono::Duration;

    fn request(task_id: i64, notify_in: Duration) -> ScheduleRequest {
        ScheduleRequest {
            task_id,
            title: "Team Meeting".to_string(),
            due_date: NaiveDate::from_ymd_opt(2025, 2, 25).unwrap(),
            priority: Priority::High,
            notify_time: Utc::now() + notify_in,
        }
    }

    #[test]
    fn test_create_and_get() {
        let db = ReminderDb::in_memory().unwrap();
        let created = db.create(request(1, Duration::hours(1))).unwrap();
        assert_eq!(created.version, 1);
        assert_eq!(created.status, ReminderStatus::Scheduled);

        let fetched = db.get(1).unwrap();
        assert_eq!(fetched.task_id, 1);
        assert_eq!(fetched.title, "Team Meeting");
        assert_eq!(fetched.priority, Priority::High);
        assert_eq!(fetched.notify_time, created.notify_time);
    }

    #[test]
    fn test_create_duplicate_rejected() {
        let db = ReminderDb::in_memory().unwrap();
        db.create(request(1, Duration::hours(1))).unwrap();

        let err = db.create(request(1, Duration::hours(2))).unwrap_err();
        assert!(matches!(err, StoreError::DuplicateTask(1)));
    }

    #[test]
    fn test_create_past_time_rejected() {
        let db = ReminderDb::in_memory().unwrap();
        let err = db.create(request(1, Duration::seconds(-30))).unwrap_err();
        assert!(matches!(err, StoreError::InvalidNotifyTime));
        assert!(matches!(db.get(1).unwrap_err(), StoreError::NotFound(1)));
    }

    #[test]
    fn test_create_empty_title_rejected() {
        let db = ReminderDb::in_memory().unwrap();
        let mut req = request(1, Duration::hours(1));
        req.title = "   ".to_string();
        let err = db.create(req).unwrap_err();
        assert!(matches!(err, StoreError::InvalidTitle));
    }

    #[test]
    fn test_get_missing() {
        let db = ReminderDb::in_memory().unwrap();
        assert!(matches!(db.get(99).unwrap_err(), StoreError::NotFound(99)));
    }

    #[test]
    fn test_update_bumps_version_and_replaces_fields() {
        let db = ReminderDb::in_memory().unwrap();
        db.create(request(1, Duration::hours(1))).unwrap();

        let new_time = Utc::now() + Duration::hours(2);
        let update = ReminderUpdate::at(new_time)
            .with_title("Updated Meeting")
            .with_priority(Priority::Medium);
        let updated = db.update(1, update).unwrap();

        assert_eq!(updated.version, 2);
        assert_eq!(updated.title, "Updated Meeting");
        assert_eq!(updated.priority, Priority::Medium);
        assert_eq!(updated.notify_time, new_time);
        assert_eq!(updated.status, ReminderStatus::Scheduled);
    }

    #[test]
    fn test_update_keeps_unset_fields() {
        let db = ReminderDb::in_memory().unwrap();
        db.create(request(1, Duration::hours(1))).unwrap();

        let updated = db
            .update(1, ReminderUpdate::at(Utc::now() + Duration::hours(3)))
            .unwrap();
        assert_eq!(updated.title, "Team Meeting");
        assert_eq!(updated.priority, Priority::High);
        assert_eq!(updated.version, 2);
    }

    #[test]
    fn test_update_past_time_rejected_version_unchanged() {
        let db = ReminderDb::in_memory().unwrap();
        db.create(request(1, Duration::hours(1))).unwrap();

        let err = db
            .update(1, ReminderUpdate::at(Utc::now() - Duration::seconds(1)))
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidNotifyTime));
        assert_eq!(db.get(1).unwrap().version, 1);
    }

    #[test]
    fn test_update_terminal_returns_not_found() {
        let db = ReminderDb::in_memory().unwrap();
        let created = db.create(request(1, Duration::hours(1))).unwrap();
        assert!(db.mark_dispatched(1, created.version).unwrap());

        let err = db
            .update(1, ReminderUpdate::at(Utc::now() + Duration::hours(2)))
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(1)));

        db.create(request(2, Duration::hours(1))).unwrap();
        db.cancel(2).unwrap();
        let err = db
            .update(2, ReminderUpdate::at(Utc::now() + Duration::hours(2)))
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(2)));
    }

    #[test]
    fn test_cancel_then_reads_not_found() {
        let db = ReminderDb::in_memory().unwrap();
        db.create(request(1, Duration::hours(1))).unwrap();

        let canceled = db.cancel(1).unwrap();
        assert_eq!(canceled.status, ReminderStatus::Canceled);

        assert!(matches!(db.get(1).unwrap_err(), StoreError::NotFound(1)));
        assert!(matches!(db.cancel(1).unwrap_err(), StoreError::NotFound(1)));
    }

    #[test]
    fn test_recreate_after_cancel() {
        let db = ReminderDb::in_memory().unwrap();
        db.create(request(1, Duration::hours(1))).unwrap();
        db.update(1, ReminderUpdate::at(Utc::now() + Duration::hours(2)))
            .unwrap();
        db.cancel(1).unwrap();

        let fresh = db.create(request(1, Duration::hours(4))).unwrap();
        assert_eq!(fresh.version, 1);
        assert_eq!(fresh.status, ReminderStatus::Scheduled);
    }

    #[test]
    fn test_mark_dispatched_cas() {
        let db = ReminderDb::in_memory().unwrap();
        db.create(request(1, Duration::hours(1))).unwrap();
        let updated = db
            .update(1, ReminderUpdate::at(Utc::now() + Duration::hours(2)))
            .unwrap();
        assert_eq!(updated.version, 2);

        // Stale version loses the compare-and-set
        assert!(!db.mark_dispatched(1, 1).unwrap());
        assert_eq!(db.get(1).unwrap().status, ReminderStatus::Scheduled);

        // Current version wins exactly once
        assert!(db.mark_dispatched(1, 2).unwrap());
        assert_eq!(db.get(1).unwrap().status, ReminderStatus::Dispatched);
        assert!(!db.mark_dispatched(1, 2).unwrap());
    }

    #[test]
    fn test_mark_dispatched_after_cancel_is_noop() {
        let db = ReminderDb::in_memory().unwrap();
        db.create(request(1, Duration::hours(1))).unwrap();
        db.cancel(1).unwrap();

        assert!(!db.mark_dispatched(1, 1).unwrap());
    }

    #[test]
    fn test_mark_dispatched_unknown_task() {
        let db = ReminderDb::in_memory().unwrap();
        assert!(!db.mark_dispatched(42, 1).unwrap());
    }

    #[test]
    fn test_list_active_filters_and_sorts() {
        let db = ReminderDb::in_memory().unwrap();
        db.create(request(1, Duration::hours(3))).unwrap();
        db.create(request(2, Duration::hours(1))).unwrap();
        db.create(request(3, Duration::hours(2))).unwrap();
        db.create(request(4, Duration::hours(4))).unwrap();

        db.cancel(3).unwrap();
        let v = db.get(4).unwrap().version;
        assert!(db.mark_dispatched(4, v).unwrap());

        let active = db.list_active().unwrap();
        let ids: Vec<i64> = active.iter().map(|r| r.task_id).collect();
        assert_eq!(ids, vec![2, 1]);
    }

    #[test]
    fn test_open_creates_parent_dirs() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("nested").join("reminders.db");
        let db = ReminderDb::open(&path).unwrap();
        db.create(request(1, Duration::hours(1))).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_reopen_preserves_records() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("reminders.db");

        {
            let db = ReminderDb::open(&path).unwrap();
            db.create(request(7, Duration::hours(1))).unwrap();
        }

        let db = ReminderDb::open(&path).unwrap();
        let reminder = db.get(7).unwrap();
        assert_eq!(reminder.task_id, 7);
        assert_eq!(reminder.status, ReminderStatus::Scheduled);
    }

    #[test]
    fn test_version_monotonic_over_updates() {
        let db = ReminderDb::in_memory().unwrap();
        db.create(request(1, Duration::hours(1))).unwrap();

        for expected in 2..=6 {
            let updated = db
                .update(1, ReminderUpdate::at(Utc::now() + Duration::hours(expected)))
                .unwrap();
            assert_eq!(updated.version, expected);
        }
    }

    fn arb_update() -> impl Strategy<Value = ReminderUpdate> {
        (
            1u32..48,
            prop::option::of("[a-z]{1,12}"),
            prop::option::of(prop::sample::select(vec![
                Priority::Low,
                Priority::Medium,
                Priority::High,
            ])),
        )
            .prop_map(|(hours, title, priority)| {
                let mut update = ReminderUpdate::at(Utc::now() + Duration::hours(i64::from(hours)));
                update.title = title;
                update.priority = priority;
                update
            })
    }

    proptest! {
        #[test]
        fn prop_version_counts_successful_updates(updates in prop::collection::vec(arb_update(), 0..12)) {
            let db = ReminderDb::in_memory().unwrap();
            db.create(request(1, Duration::hours(1))).unwrap();

            let mut last_version = 1;
            for update in updates {
                let updated = db.update(1, update).unwrap();
                prop_assert_eq!(updated.version, last_version + 1);
                last_version = updated.version;
            }
            prop_assert_eq!(db.get(1).unwrap().version, last_version);
        }
    }
}
