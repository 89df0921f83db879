use crate::event::{EventReceiver, EventSender, MonitorEvent};
use crate::scanner::{ScanError, ScanFailure, Scanner};
use history_store::{HistoryStore, StoreError};
use scanwatch_core::{DifferenceSet, ScanSnapshot, Scheduler, TargetConfig, TargetDraft, TargetError};
use std::collections::BTreeMap;
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Front door of the monitoring engine: target management, recurring and
/// one-shot scans, and history queries. Scan outcomes are reported on the
/// event channel returned by [`Monitor::new`].
pub struct Monitor {
    inner: Arc<Inner>,
}

struct Inner {
    store: Arc<HistoryStore>,
    scanner: Arc<dyn Scanner>,
    scheduler: Scheduler,
    events: EventSender,
}

impl Monitor {
    pub fn new(store: Arc<HistoryStore>, scanner: Arc<dyn Scanner>) -> (Self, EventReceiver) {
        let (events, rx) = mpsc::unbounded_channel();
        let inner = Inner { store, scanner, scheduler: Scheduler::new(), events };
        (Monitor { inner: Arc::new(inner) }, rx)
    }

    pub fn add_target(&self, name: &str, draft: TargetDraft) -> Result<TargetConfig, TargetError> {
        let (config, persisted) = self.inner.store.add_target(name, draft)?.into_parts();
        self.inner.report_persistence(name, persisted);
        Ok(config)
    }

    /// Stop the target's timer, then drop its configuration and history.
    pub fn remove_target(&self, name: &str) -> Result<(), TargetError> {
        self.inner.scheduler.disarm(name);
        let ((), persisted) = self.inner.store.remove_target(name)?.into_parts();
        self.inner.report_persistence(name, persisted);
        Ok(())
    }

    /// Disabling a target also stops its timer.
    pub fn set_enabled(&self, name: &str, enabled: bool) -> Result<(), TargetError> {
        let ((), persisted) = self.inner.store.set_enabled(name, enabled)?.into_parts();
        self.inner.report_persistence(name, persisted);
        if !enabled {
            self.stop(name);
        }
        Ok(())
    }

    /// Scan now and then every configured interval. Starting a running
    /// target restarts its countdown. Must be called inside a Tokio runtime.
    pub fn start(&self, name: &str) -> Result<(), TargetError> {
        let config = self.inner.store.target(name).ok_or_else(|| TargetError::NotFound(name.to_string()))?;
        if !config.enabled {
            return Err(TargetError::Disabled(name.to_string()));
        }
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let label = name.to_string();
        self.inner.scheduler.arm(name, config.interval(), move || {
            let Some(inner) = weak.upgrade() else { return };
            let name = label.clone();
            tokio::spawn(async move {
                let _ = inner.execute(&name).await;
            });
        });
        info!(target_name = %name, interval_minutes = config.interval_minutes, "monitoring started");
        Ok(())
    }

    /// Returns false when the target was not running.
    pub fn stop(&self, name: &str) -> bool {
        let stopped = self.inner.scheduler.disarm(name);
        if stopped {
            info!(target_name = %name, "monitoring stopped");
        }
        stopped
    }

    pub fn stop_all(&self) { self.inner.scheduler.disarm_all(); }

    /// Start every enabled target; returns the names started.
    pub fn start_all_enabled(&self) -> Vec<String> {
        let mut started = Vec::new();
        for (name, config) in self.inner.store.list_targets() {
            if !config.enabled {
                continue;
            }
            match self.start(&name) {
                Ok(()) => started.push(name),
                Err(e) => warn!(target_name = %name, error = %e, "could not start monitoring"),
            }
        }
        started
    }

    pub fn is_running(&self, name: &str) -> bool { self.inner.scheduler.is_armed(name) }

    pub fn running(&self) -> Vec<String> { self.inner.scheduler.armed() }

    /// Run one scan right away, outside the timer, and wait for it.
    pub async fn scan_now(&self, name: &str) -> Result<DifferenceSet, ScanError> { self.inner.execute(name).await }

    pub fn list_targets(&self) -> BTreeMap<String, TargetConfig> { self.inner.store.list_targets() }

    pub fn history(&self, name: &str, limit: usize) -> Vec<ScanSnapshot> { self.inner.store.get_history(name, limit) }

    pub fn latest_diff(&self, name: &str) -> Result<DifferenceSet, TargetError> { self.inner.store.latest_diff(name) }
}

impl Inner {
    fn emit(&self, event: MonitorEvent) {
        // nobody listening is fine
        let _ = self.events.send(event);
    }

    fn report_persistence(&self, name: &str, persisted: Option<StoreError>) {
        if let Some(e) = persisted {
            warn!(target_name = %name, error = %e, "change kept in memory only");
            self.emit(MonitorEvent::error(name, ScanFailure::Persistence, e.to_string()));
        }
    }

    async fn execute(&self, name: &str) -> Result<DifferenceSet, ScanError> {
        let result = self.run(name).await;
        if let Err(e) = &result {
            warn!(target_name = %name, kind = ?e.kind, error = %e.message, "scan failed");
            self.emit(MonitorEvent::error(name, e.kind, e.message.clone()));
        }
        result
    }

    async fn run(&self, name: &str) -> Result<DifferenceSet, ScanError> {
        let not_configured = || ScanError::new(ScanFailure::Target, format!("{name} is not configured"));
        // results go to the history that existed when the scan started
        let ticket = self.store.begin_scan(name).map_err(|_| not_configured())?;
        let config = self.store.target(name).ok_or_else(not_configured)?;
        self.emit(MonitorEvent::progress(name, format!("scanning {} ({})", config.target, config.scan_type)));

        let mut snapshot = self.scanner.scan(name, &config).await?;
        snapshot.target_name = name.to_string();
        self.emit(MonitorEvent::progress(name, format!("{} hosts reported", snapshot.hosts.len())));

        let store = Arc::clone(&self.store);
        let recorded = snapshot.clone();
        let committed = tokio::task::spawn_blocking(move || store.finish_scan(&ticket, recorded))
            .await
            .map_err(|e| ScanError::new(ScanFailure::Persistence, format!("{name}: {e}")))?
            .map_err(|e| ScanError::new(ScanFailure::Target, e.to_string()))?;
        let (differences, persisted) = committed.into_parts();
        self.report_persistence(name, persisted);

        info!(
            target_name = %name,
            hosts = snapshot.hosts.len(),
            changes = differences.total(),
            "scan completed"
        );
        self.emit(MonitorEvent::completed(name, snapshot, differences.clone()));
        Ok(differences)
    }
}
