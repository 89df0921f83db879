use crate::layout::{read_json, Layout};
use crate::{HistoryStore, StoreError, TargetHistory};
use scanwatch_core::{ScanSnapshot, TargetConfig};
use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

impl HistoryStore {
    /// Open (creating if needed) the data directory and load what it holds.
    ///
    /// Loading is best-effort. A config file that is not a JSON object yields
    /// no targets; a single record that does not describe a target is set
    /// aside and written back unchanged on the next save, while the others
    /// load normally. A malformed history file yields an empty history for
    /// that target. Those problems are returned alongside the store; only
    /// failing to create the directory is fatal.
    pub fn open(root: impl AsRef<Path>) -> Result<(Self, Vec<StoreError>), StoreError> {
        let root = root.as_ref();
        std::fs::create_dir_all(root).map_err(|source| StoreError::Io { path: root.to_path_buf(), source })?;
        let layout = Layout::new(root);
        let mut problems = Vec::new();

        let records: BTreeMap<String, Value> = match read_json(&layout.config_path()) {
            Ok(found) => found.unwrap_or_default(),
            Err(e) => {
                warn!(error = %e, "ignoring unreadable target configuration");
                problems.push(e);
                BTreeMap::new()
            }
        };
        let mut configs = BTreeMap::new();
        let mut unusable = BTreeMap::new();
        for (name, raw) in records {
            match TargetConfig::deserialize(&raw) {
                Ok(config) => {
                    configs.insert(name, config);
                }
                Err(source) => {
                    warn!(target_name = %name, error = %source, "keeping unusable target record aside");
                    problems.push(StoreError::Record { path: layout.config_path(), name: name.clone(), source });
                    unusable.insert(name, raw);
                }
            }
        }

        let mut histories = HashMap::new();
        for name in configs.keys() {
            let snapshots: Vec<ScanSnapshot> = match read_json(&layout.history_path(name)) {
                Ok(found) => found.unwrap_or_default(),
                Err(e) => {
                    warn!(target_name = %name, error = %e, "ignoring unreadable history");
                    problems.push(e);
                    Vec::new()
                }
            };
            histories.insert(name.clone(), Arc::new(Mutex::new(TargetHistory::from_loaded(snapshots))));
        }

        info!(dir = %root.display(), targets = configs.len(), unusable = unusable.len(), "history store opened");
        let store = HistoryStore {
            layout,
            configs: Mutex::new(configs),
            unusable: Mutex::new(unusable),
            histories: Mutex::new(histories),
        };
        Ok((store, problems))
    }
}
