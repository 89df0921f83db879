//! One recurring timer per monitored target.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::debug;

/// Timers keyed by target name. Each timer fires once immediately and then
/// every period until disarmed. The fire action must not block: it runs on
/// the timer task.
#[derive(Default)]
pub struct Scheduler {
    timers: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new() -> Self { Self::default() }

    /// Arm (or re-arm) the timer for `name`. An existing timer is torn down
    /// first, so the countdown restarts and `fire` runs again right away.
    /// Must be called from within a Tokio runtime.
    pub fn arm<F>(&self, name: &str, period: Duration, fire: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        let period = period.max(Duration::from_millis(1));
        let label = name.to_string();
        let mut timers = self.timers();
        if let Some(old) = timers.remove(name) {
            old.abort();
        }
        let handle = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                debug!(target_name = %label, "timer fired");
                fire();
            }
        });
        timers.insert(name.to_string(), handle);
    }

    /// Returns false when no timer was armed.
    pub fn disarm(&self, name: &str) -> bool {
        match self.timers().remove(name) {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    pub fn is_armed(&self, name: &str) -> bool { self.timers().contains_key(name) }

    pub fn armed(&self) -> Vec<String> {
        let mut names: Vec<String> = self.timers().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn disarm_all(&self) {
        for (_, handle) in self.timers().drain() {
            handle.abort();
        }
    }

    fn timers(&self) -> MutexGuard<'_, HashMap<String, JoinHandle<()>>> {
        self.timers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) { self.disarm_all(); }
}
