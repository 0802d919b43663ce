//! TimerRegistry - per-task armed timers
//!
//! Holds one cancellable sleep task per task_id together with the version it
//! was armed for. This map is a cache of intent only: whether a firing
//! actually delivers is decided by the store's version/status check at
//! expiry, never by this registry.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;

/// A single armed timer: the spawned sleep task and the version it carries
struct ArmedTimer {
    version: i64,
    handle: JoinHandle<()>,
}

/// In-memory index of currently armed timers, one per active task
pub struct TimerRegistry {
    timers: Arc<Mutex<HashMap<i64, ArmedTimer>>>,
}

impl Default for TimerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TimerRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            timers: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Arm a timer that runs `on_expire` at `fire_at`, replacing (and
    /// aborting) any timer already armed for this task_id
    ///
    /// The delay is recomputed from `fire_at - now` here, at arm time; a
    /// deadline already in the past fires immediately.
    pub async fn arm<F>(&self, task_id: i64, version: i64, fire_at: DateTime<Utc>, on_expire: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let delay = (fire_at - Utc::now())
            .to_std()
            .unwrap_or(std::time::Duration::ZERO);
        debug!(%task_id, %version, fire_at = %fire_at, delay_ms = delay.as_millis() as u64, "arm: called");

        let timers = self.timers.clone();
        let mut map = self.timers.lock().await;

        if let Some(old) = map.remove(&task_id) {
            debug!(%task_id, old_version = old.version, "arm: replacing armed timer");
            old.handle.abort();
        }

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            on_expire.await;

            // Evict our own entry unless a newer arm has replaced it
            let mut map = timers.lock().await;
            if map.get(&task_id).is_some_and(|armed| armed.version == version) {
                map.remove(&task_id);
            }
        });

        map.insert(task_id, ArmedTimer { version, handle });
    }

    /// Abort the timer for a task if one is armed; no-op if absent
    pub async fn disarm(&self, task_id: i64) -> bool {
        let mut map = self.timers.lock().await;
        match map.remove(&task_id) {
            Some(armed) => {
                debug!(%task_id, version = armed.version, "disarm: aborting timer");
                armed.handle.abort();
                true
            }
            None => {
                debug!(%task_id, "disarm: nothing armed");
                false
            }
        }
    }

    /// Check whether a timer is currently armed for a task
    pub async fn is_armed(&self, task_id: i64) -> bool {
        self.timers.lock().await.contains_key(&task_id)
    }

    /// Number of currently armed timers
    pub async fn armed_count(&self) -> usize {
        self.timers.lock().await.len()
    }

    /// Abort every armed timer (shutdown path; the store remains the source
    /// of truth for what should fire after a restart)
    pub async fn drain(&self) {
        let mut map = self.timers.lock().await;
        let count = map.len();
        for (_, armed) in map.drain() {
            armed.handle.abort();
        }
        debug!(count, "drain: aborted all armed timers");
    }
}
