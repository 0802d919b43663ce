//! Wire types for the CLI/daemon socket protocol
//!
//! Simple JSON-over-newline protocol. Each message is a single line of
//! JSON followed by `\n`.

use serde::{Deserialize, Serialize};

use crate::domain::{Reminder, ReminderUpdate, ScheduleRequest};

/// Requests the CLI sends to the daemon
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum DaemonMessage {
    /// Create a reminder and arm its timer
    Schedule { request: ScheduleRequest },

    /// Move a scheduled reminder to a new notify time
    Reschedule { task_id: i64, update: ReminderUpdate },

    /// Cancel a scheduled reminder
    Cancel { task_id: i64 },

    /// Fetch a single reminder
    Get { task_id: i64 },

    /// List scheduled reminders ordered by notify time
    List,

    /// Liveness check
    Ping,

    /// Request a graceful stop
    Shutdown,
}

/// Replies the daemon sends back
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum DaemonResponse {
    /// Plain acknowledgment, currently only for Shutdown
    Ok,

    /// A single reminder record
    Reminder { reminder: Reminder },

    /// A list of reminder records
    Reminders { reminders: Vec<Reminder> },

    /// Liveness reply carrying the daemon's version
    Pong { version: String },

    /// Failure; carries the store error message verbatim
    Error { message: String },
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::domain::Priority;

    fn sample_request() -> ScheduleRequest {
        ScheduleRequest {
            task_id: 42,
            title: "Water plants".to_string(),
            due_date: Utc::now().date_naive(),
            priority: Priority::High,
            notify_time: Utc::now() + chrono::Duration::hours(1),
        }
    }

    #[test]
    fn test_request_wire_format_is_type_tagged() {
        let cases = [
            (DaemonMessage::Cancel { task_id: 7 }, r#"{"type":"Cancel","task_id":7}"#),
            (DaemonMessage::List, r#"{"type":"List"}"#),
            (DaemonMessage::Ping, r#"{"type":"Ping"}"#),
            (DaemonMessage::Shutdown, r#"{"type":"Shutdown"}"#),
        ];
        for (msg, expected) in cases {
            assert_eq!(serde_json::to_string(&msg).unwrap(), expected);
        }
    }

    #[test]
    fn test_get_deserialize() {
        let json = r#"{"type":"Get","task_id":12}"#;
        let msg: DaemonMessage = serde_json::from_str(json).unwrap();
        assert_eq!(msg, DaemonMessage::Get { task_id: 12 });
    }

    #[test]
    fn test_schedule_roundtrip() {
        let msg = DaemonMessage::Schedule {
            request: sample_request(),
        };
        let json = serde_json::to_string(&msg).unwrap();
        let parsed: DaemonMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(msg, parsed);
    }

    #[test]
    fn test_reschedule_roundtrip() {
        let msg = DaemonMessage::Reschedule {
            task_id: 4,
            update: ReminderUpdate::at(Utc::now() + chrono::Duration::minutes(30))
                .with_title("Updated"),
        };
        let json = serde_json::to_string(&msg).unwrap();
        let parsed: DaemonMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(msg, parsed);
    }

    #[test]
    fn test_response_wire_format_is_type_tagged() {
        assert_eq!(
            serde_json::to_string(&DaemonResponse::Ok).unwrap(),
            r#"{"type":"Ok"}"#
        );
        assert_eq!(
            serde_json::to_string(&DaemonResponse::Pong {
                version: "1.0.0".to_string(),
            })
            .unwrap(),
            r#"{"type":"Pong","version":"1.0.0"}"#
        );
    }

    #[test]
    fn test_error_response_keeps_message_text() {
        let resp = DaemonResponse::Error {
            message: "Reminder not found for task 9".to_string(),
        };
        let json = serde_json::to_string(&resp).unwrap();
        assert_eq!(
            json,
            r#"{"type":"Error","message":"Reminder not found for task 9"}"#
        );
    }

    #[test]
    fn test_reminder_response_roundtrip() {
        let request = sample_request();
        let resp = DaemonResponse::Reminder {
            reminder: Reminder::new(
                request.task_id,
                request.title,
                request.due_date,
                request.priority,
                request.notify_time,
            ),
        };
        let json = serde_json::to_string(&resp).unwrap();
        let parsed: DaemonResponse = serde_json::from_str(&json).unwrap();
        assert_eq!(resp, parsed);
    }

    #[test]
    fn test_reminders_response_roundtrip() {
        let request = sample_request();
        let reminder = Reminder::new(
            request.task_id,
            request.title,
            request.due_date,
            request.priority,
            request.notify_time,
        );
        let resp = DaemonResponse::Reminders {
            reminders: vec![reminder],
        };
        let json = serde_json::to_string(&resp).unwrap();
        let parsed: DaemonResponse = serde_json::from_str(&json).unwrap();
        assert_eq!(resp, parsed);
    }
}
