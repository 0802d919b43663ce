//! Startup recovery
//!
//! Re-arms timers for reminders that survived a restart and pushes the
//! ones whose notify time passed while the daemon was down through the
//! normal expiry path.

use chrono::Utc;
use tracing::{debug, info};

use super::DispatchEngine;

/// Recovery statistics
#[derive(Debug, Default)]
pub struct RecoveryStats {
    /// Number of scheduled reminders found in the store
    pub scanned: usize,
    /// Number of reminders re-armed for a future notify time
    pub rearmed: usize,
    /// Number of past-due reminders dispatched immediately
    pub fired_immediately: usize,
}

impl std::fmt::Display for RecoveryStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "scanned: {}, re-armed: {}, fired immediately: {}",
            self.scanned, self.rearmed, self.fired_immediately
        )
    }
}

/// Scan the store for scheduled reminders and bring the timer registry
/// back in line with it
///
/// Past-due reminders go through on_expire like any live firing, so the
/// version guard and retry policy apply to them unchanged. Run this
/// after the store is up and before the request surface starts
/// accepting, so nothing can reschedule underneath the scan.
pub async fn recover(engine: &DispatchEngine) -> eyre::Result<RecoveryStats> {
    info!("Starting reminder recovery");
    let mut stats = RecoveryStats::default();

    let active = engine
        .list_active()
        .await
        .map_err(|e| eyre::eyre!("Failed to list scheduled reminders: {}", e))?;
    stats.scanned = active.len();

    let now = Utc::now();
    for reminder in &active {
        if reminder.is_past_due(now) {
            debug!(
                task_id = reminder.task_id,
                version = reminder.version,
                notify_time = %reminder.notify_time,
                "Found past-due reminder, dispatching now"
            );
            let engine = engine.clone();
            let (task_id, version) = (reminder.task_id, reminder.version);
            tokio::spawn(async move {
                engine.on_expire(task_id, version).await;
            });
            stats.fired_immediately += 1;
        } else {
            debug!(
                task_id = reminder.task_id,
                version = reminder.version,
                notify_time = %reminder.notify_time,
                "Re-arming reminder"
            );
            engine.arm_from(reminder).await;
            stats.rearmed += 1;
        }
    }

    if stats.scanned > 0 {
        info!("Recovery complete: {}", stats);
    } else {
        debug!("Recovery found no scheduled reminders");
    }

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::Utc;

    use super::*;
    use crate::config::DispatchConfig;
    use crate::domain::{ReminderStatus, ScheduleRequest};
    use crate::engine::notifier::mock::MockNotifier;
    use crate::store::ReminderStore;
    use crate::timer::TimerRegistry;

    fn request(task_id: i64, in_ms: i64) -> ScheduleRequest {
        ScheduleRequest {
            task_id,
            title: format!("task {}", task_id),
            due_date: Utc::now().date_naive(),
            priority: Default::default(),
            notify_time: Utc::now() + chrono::Duration::milliseconds(in_ms),
        }
    }

    /// Store records created through the bare store handle have no armed
    /// timers, which is exactly the state a fresh process wakes up in.
    async fn seeded_engine(
        requests: Vec<ScheduleRequest>,
    ) -> (DispatchEngine, Arc<TimerRegistry>, Arc<MockNotifier>) {
        let store = ReminderStore::spawn_in_memory().unwrap();
        for request in requests {
            store.create(request).await.unwrap();
        }

        let timers = Arc::new(TimerRegistry::new());
        let notifier = Arc::new(MockNotifier::new());
        let engine = DispatchEngine::new(
            store,
            timers.clone(),
            notifier.clone(),
            DispatchConfig::default(),
        );
        (engine, timers, notifier)
    }

    #[tokio::test]
    async fn test_recovery_empty_store() {
        let (engine, timers, notifier) = seeded_engine(vec![]).await;

        let stats = recover(&engine).await.unwrap();

        assert_eq!(stats.scanned, 0);
        assert_eq!(stats.rearmed, 0);
        assert_eq!(stats.fired_immediately, 0);
        assert_eq!(timers.armed_count().await, 0);
        assert_eq!(notifier.call_count(), 0);
    }

    #[tokio::test]
    async fn test_recovery_rearms_future_reminder() {
        let (engine, timers, notifier) = seeded_engine(vec![request(1, 60_000)]).await;

        let stats = recover(&engine).await.unwrap();

        assert_eq!(stats.scanned, 1);
        assert_eq!(stats.rearmed, 1);
        assert_eq!(stats.fired_immediately, 0);
        assert!(timers.is_armed(1).await);
        assert_eq!(notifier.call_count(), 0);
    }

    #[tokio::test]
    async fn test_recovery_fires_past_due_once() {
        let (engine, timers, notifier) = seeded_engine(vec![request(1, 100)]).await;

        // Let the notify time pass before recovery runs, as if the
        // process had been down across it
        tokio::time::sleep(Duration::from_millis(300)).await;

        let stats = recover(&engine).await.unwrap();
        assert_eq!(stats.fired_immediately, 1);
        assert_eq!(timers.armed_count().await, 0);

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(notifier.deliveries().len(), 1);
        assert_eq!(engine.get(1).await.unwrap().status, ReminderStatus::Dispatched);

        // A second recovery pass finds nothing left to do
        let stats = recover(&engine).await.unwrap();
        assert_eq!(stats.scanned, 0);
        assert_eq!(notifier.deliveries().len(), 1);
    }

    #[tokio::test]
    async fn test_recovery_mixed_past_due_and_future() {
        let (engine, timers, notifier) =
            seeded_engine(vec![request(1, 100), request(2, 60_000)]).await;

        tokio::time::sleep(Duration::from_millis(300)).await;

        let stats = recover(&engine).await.unwrap();
        assert_eq!(stats.scanned, 2);
        assert_eq!(stats.rearmed, 1);
        assert_eq!(stats.fired_immediately, 1);
        assert!(timers.is_armed(2).await);

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(notifier.deliveries(), vec![(1, "task 1".to_string())]);
        assert_eq!(engine.get(2).await.unwrap().status, ReminderStatus::Scheduled);
    }
}
