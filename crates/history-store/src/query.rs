use crate::{lock, HistoryStore};
use scanwatch_core::{DifferenceSet, ScanSnapshot, TargetConfig, TargetError};
use std::collections::BTreeMap;

impl HistoryStore {
    pub fn list_targets(&self) -> BTreeMap<String, TargetConfig> { self.configs().clone() }

    pub fn target(&self, name: &str) -> Option<TargetConfig> { self.configs().get(name).cloned() }

    /// The last `limit` snapshots, oldest first. Unknown targets have no history.
    pub fn get_history(&self, name: &str, limit: usize) -> Vec<ScanSnapshot> {
        let Some(entry) = self.entry(name) else { return Vec::new() };
        let history = lock(&entry);
        let skip = history.snapshots.len().saturating_sub(limit);
        history.snapshots.iter().skip(skip).cloned().collect()
    }

    pub fn history_len(&self, name: &str) -> usize {
        self.entry(name).map(|e| lock(&e).snapshots.len()).unwrap_or(0)
    }

    /// Recompute the difference set between the two newest snapshots.
    pub fn latest_diff(&self, name: &str) -> Result<DifferenceSet, TargetError> {
        let entry = self.entry(name).ok_or_else(|| TargetError::NotFound(name.to_string()))?;
        let history = lock(&entry);
        Ok(history.latest_diff())
    }
}
