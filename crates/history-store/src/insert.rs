use crate::layout::{file_stem, remove_file};
use crate::{lock, Committed, HistoryStore, ScanTicket, TargetHistory};
use scanwatch_core::{now_rfc3339, DifferenceSet, ScanSnapshot, TargetConfig, TargetDraft, TargetError};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

impl HistoryStore {
    /// Register a new target with an empty history.
    ///
    /// Names that map to the same file name as an existing target are
    /// rejected, since the two would share a history file.
    pub fn add_target(&self, name: &str, draft: TargetDraft) -> Result<Committed<TargetConfig>, TargetError> {
        let mut configs = self.configs();
        if let Some(taken) = self.claimed_stem(&configs, name) {
            if taken == name {
                return Err(TargetError::AlreadyExists(name.to_string()));
            }
            return Err(TargetError::InvalidConfig {
                name: name.to_string(),
                reason: format!("file name collides with target {taken:?}"),
            });
        }
        let config = draft.validate(name, now_rfc3339())?;
        configs.insert(name.to_string(), config.clone());
        self.histories().insert(name.to_string(), Arc::new(Mutex::new(TargetHistory::default())));
        let persisted = self.persist_configs(&configs);
        info!(target_name = %name, target = %config.target, profile = %config.scan_type, "target added");
        Ok(Committed::new(config, persisted))
    }

    /// The stored name, valid or set aside, whose files `name` would use.
    fn claimed_stem(&self, configs: &BTreeMap<String, TargetConfig>, name: &str) -> Option<String> {
        let unusable = self.unusable();
        if configs.contains_key(name) || unusable.contains_key(name) {
            return Some(name.to_string());
        }
        let stem = file_stem(name);
        configs.keys().chain(unusable.keys()).find(|k| file_stem(k) == stem).cloned()
    }

    /// Delete a target's configuration, history, history file and leftover reports.
    pub fn remove_target(&self, name: &str) -> Result<Committed<()>, TargetError> {
        let entry = self.histories().remove(name);
        let _history = entry.as_ref().map(|e| {
            let mut history = lock(e);
            history.removed = true;
            history.snapshots.clear();
            history
        });
        let mut configs = self.configs();
        let configured = configs.remove(name).is_some();
        let set_aside = self.unusable().remove(name).is_some();
        if !configured && !set_aside && entry.is_none() {
            return Err(TargetError::NotFound(name.to_string()));
        }
        let mut persisted = remove_file(&self.layout.history_path(name));
        for artifact in self.layout.artifacts(name) {
            persisted = persisted.and(remove_file(&artifact));
        }
        persisted = persisted.and(self.persist_configs(&configs));
        info!(target_name = %name, "target removed");
        Ok(Committed::new((), persisted))
    }

    pub fn set_enabled(&self, name: &str, enabled: bool) -> Result<Committed<()>, TargetError> {
        let mut configs = self.configs();
        let config = configs.get_mut(name).ok_or_else(|| TargetError::NotFound(name.to_string()))?;
        config.enabled = enabled;
        let persisted = self.persist_configs(&configs);
        Ok(Committed::new((), persisted))
    }

    /// Append a snapshot, evicting the oldest beyond the cap. Returns the new length.
    pub fn append_snapshot(&self, name: &str, snapshot: ScanSnapshot) -> Result<Committed<usize>, TargetError> {
        let entry = self.entry(name).ok_or_else(|| TargetError::NotFound(name.to_string()))?;
        let mut history = lock(&entry);
        if history.removed {
            return Err(TargetError::NotFound(name.to_string()));
        }
        history.push(snapshot);
        let persisted = self.persist_history(name, &history);
        debug!(target_name = %name, len = history.snapshots.len(), "snapshot appended");
        Ok(Committed::new(history.snapshots.len(), persisted))
    }

    /// Pin the target's current history before a scan starts.
    pub fn begin_scan(&self, name: &str) -> Result<ScanTicket, TargetError> {
        let entry = self.entry(name).ok_or_else(|| TargetError::NotFound(name.to_string()))?;
        Ok(ScanTicket { name: name.to_string(), entry })
    }

    /// Append a completed scan, diff it against the previous snapshot and
    /// stamp the target's last-scan time, all under the target's lock so
    /// overlapping scans always diff against their true predecessor.
    pub fn finish_scan(
        &self,
        ticket: &ScanTicket,
        snapshot: ScanSnapshot,
    ) -> Result<Committed<DifferenceSet>, TargetError> {
        let name = ticket.name();
        let mut history = lock(&ticket.entry);
        if history.removed {
            return Err(TargetError::NotFound(name.to_string()));
        }
        history.push(snapshot);
        let differences = history.latest_diff();
        let mut persisted = self.persist_history(name, &history);

        let mut configs = self.configs();
        if let Some(config) = configs.get_mut(name) {
            config.last_scan_time = Some(now_rfc3339());
        }
        persisted = persisted.and(self.persist_configs(&configs));
        debug!(target_name = %name, changes = differences.total(), "scan recorded");
        Ok(Committed::new(differences, persisted))
    }

    /// [`begin_scan`](Self::begin_scan) and [`finish_scan`](Self::finish_scan) in one step.
    pub fn record_scan(&self, name: &str, snapshot: ScanSnapshot) -> Result<Committed<DifferenceSet>, TargetError> {
        self.finish_scan(&self.begin_scan(name)?, snapshot)
    }
}
