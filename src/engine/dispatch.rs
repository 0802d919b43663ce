//! Dispatch engine
//!
//! Bridges the durable store and the in-memory timer registry. Every
//! schedule and reschedule writes the store first and arms second; every
//! firing re-reads the store before delivering, so a canceled or
//! superseded timer becomes a logged no-op instead of a duplicate
//! notification. A timer is only advisory; the store decides.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::config::DispatchConfig;
use crate::domain::{Reminder, ReminderStatus, ReminderUpdate, ScheduleRequest};
use crate::engine::notifier::Notifier;
use crate::store::{ReminderStore, StoreError, StoreResponse};
use crate::timer::TimerRegistry;

/// Coordinates reminders between the store, the timer registry, and the
/// delivery channel
///
/// Cheap to clone; each armed timer carries a clone of the engine so the
/// expiry path can reach back into the store.
#[derive(Clone)]
pub struct DispatchEngine {
    store: ReminderStore,
    timers: Arc<TimerRegistry>,
    notifier: Arc<dyn Notifier>,
    config: DispatchConfig,
}

impl DispatchEngine {
    pub fn new(
        store: ReminderStore,
        timers: Arc<TimerRegistry>,
        notifier: Arc<dyn Notifier>,
        config: DispatchConfig,
    ) -> Self {
        Self {
            store,
            timers,
            notifier,
            config,
        }
    }

    /// Create a reminder and arm its timer
    pub async fn schedule(&self, request: ScheduleRequest) -> StoreResponse<Reminder> {
        debug!(
            task_id = request.task_id,
            notify_time = %request.notify_time,
            "schedule: called"
        );

        let reminder = self.store.create(request).await?;
        self.arm_from(&reminder).await;

        info!(
            task_id = reminder.task_id,
            version = reminder.version,
            notify_time = %reminder.notify_time,
            "Reminder scheduled"
        );
        Ok(reminder)
    }

    /// Update a scheduled reminder and re-arm its timer under the new
    /// version
    ///
    /// The store bumps the version before the old timer is replaced, so
    /// even a firing that sneaks in between the two steps fails its
    /// version check and delivers nothing.
    pub async fn reschedule(&self, task_id: i64, update: ReminderUpdate) -> StoreResponse<Reminder> {
        debug!(task_id, notify_time = %update.notify_time, "reschedule: called");

        let reminder = self.store.update(task_id, update).await?;
        self.arm_from(&reminder).await;

        info!(
            task_id = reminder.task_id,
            version = reminder.version,
            notify_time = %reminder.notify_time,
            "Reminder rescheduled"
        );
        Ok(reminder)
    }

    /// Cancel a scheduled reminder and disarm its timer
    ///
    /// Store first, timer second: if a firing races with the disarm it
    /// finds the record already canceled and discards itself.
    pub async fn cancel(&self, task_id: i64) -> StoreResponse<Reminder> {
        debug!(task_id, "cancel: called");

        let reminder = self.store.cancel(task_id).await?;
        self.timers.disarm(task_id).await;

        info!(task_id, "Reminder canceled");
        Ok(reminder)
    }

    /// Fetch a single reminder
    pub async fn get(&self, task_id: i64) -> StoreResponse<Reminder> {
        self.store.get(task_id).await
    }

    /// List scheduled reminders ordered by notify time
    pub async fn list_active(&self) -> StoreResponse<Vec<Reminder>> {
        self.store.list_active().await
    }

    /// Arm (or re-arm) the timer for a record, wiring expiry back into
    /// this engine
    pub(crate) async fn arm_from(&self, reminder: &Reminder) {
        let engine = self.clone();
        let task_id = reminder.task_id;
        let version = reminder.version;
        self.timers
            .arm(task_id, version, reminder.notify_time, async move {
                engine.on_expire(task_id, version).await;
            })
            .await;
    }

    /// Expiry path: deliver at most once for the (task_id, version) the
    /// timer was armed with
    ///
    /// Reads the record, drops all locks, delivers, and only then comes
    /// back to the store for the compare-and-set to Dispatched. Any
    /// mismatch along the way means this firing was superseded.
    pub async fn on_expire(&self, task_id: i64, version: i64) {
        debug!(task_id, version, "on_expire: called");

        let reminder = match self.store.get(task_id).await {
            Ok(reminder) => reminder,
            Err(StoreError::NotFound(_)) => {
                debug!(task_id, version, "on_expire: record gone, stale firing discarded");
                return;
            }
            Err(e) => {
                error!(task_id, version, error = %e, "on_expire: store read failed");
                return;
            }
        };

        if reminder.status != ReminderStatus::Scheduled || reminder.version != version {
            debug!(
                task_id,
                version,
                current_version = reminder.version,
                status = %reminder.status,
                "on_expire: stale firing discarded"
            );
            return;
        }

        self.deliver_with_retry(&reminder, version).await;
    }

    /// Deliver with bounded retries, then settle the record
    ///
    /// On success the firing is committed through mark_dispatched; a
    /// false return there means a reschedule or cancel won the race
    /// during delivery and the notification already went out under a
    /// version the store no longer honors. That is logged and accepted:
    /// the at-most-once guarantee is per version.
    async fn deliver_with_retry(&self, reminder: &Reminder, version: i64) {
        let task_id = reminder.task_id;
        let attempts = self.config.delivery_attempts.max(1);

        for attempt in 1..=attempts {
            match self.notifier.deliver(task_id, &reminder.title).await {
                Ok(()) => {
                    match self.store.mark_dispatched(task_id, version).await {
                        Ok(true) => {
                            info!(task_id, version, "Reminder dispatched");
                        }
                        Ok(false) => {
                            debug!(
                                task_id,
                                version, "on_expire: superseded during delivery, not marked"
                            );
                        }
                        Err(e) => {
                            error!(task_id, version, error = %e, "Failed to mark reminder dispatched");
                        }
                    }
                    return;
                }
                Err(e) if attempt < attempts => {
                    warn!(
                        task_id,
                        version,
                        attempt,
                        error = %e,
                        "Delivery failed, retrying after backoff"
                    );
                    tokio::time::sleep(self.config.retry_backoff()).await;

                    // A cancel or reschedule during the backoff makes this
                    // firing stale; stop retrying on its behalf.
                    match self.store.get(task_id).await {
                        Ok(current)
                            if current.status == ReminderStatus::Scheduled
                                && current.version == version => {}
                        _ => {
                            debug!(task_id, version, "Delivery retry superseded, giving up");
                            return;
                        }
                    }
                }
                Err(e) => {
                    error!(
                        task_id,
                        version,
                        attempts,
                        error = %e,
                        "Delivery failed after all attempts, reminder left scheduled"
                    );
                }
            }
        }
    }
}
