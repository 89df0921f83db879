//! Per-target scan history and the target registry, persisted as JSON.

mod insert;
mod layout;
mod open;
mod query;

pub use layout::{failed_path, file_stem, Layout, CONFIG_FILE};

use scanwatch_core::{DifferenceSet, ScanSnapshot, TargetConfig};
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

/// Snapshots kept per target; older ones are evicted first.
pub const HISTORY_CAP: usize = 50;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("i/o error on {}: {}", .path.display(), .source)]
    Io { path: PathBuf, source: std::io::Error },
    #[error("malformed json in {}: {}", .path.display(), .source)]
    Json { path: PathBuf, source: serde_json::Error },
    #[error("unusable target {name:?} in {}: {}", .path.display(), .source)]
    Record { path: PathBuf, name: String, source: serde_json::Error },
}

/// Result of a mutation. The in-memory change always stands; `persist_error`
/// reports a failure to write it to disk.
#[must_use]
#[derive(Debug)]
pub struct Committed<T> {
    pub value: T,
    pub persist_error: Option<StoreError>,
}

impl<T> Committed<T> {
    fn new(value: T, persisted: Result<(), StoreError>) -> Self {
        Committed { value, persist_error: persisted.err() }
    }

    pub fn into_parts(self) -> (T, Option<StoreError>) { (self.value, self.persist_error) }
}

#[derive(Debug, Default)]
struct TargetHistory {
    snapshots: VecDeque<ScanSnapshot>,
    removed: bool,
}

impl TargetHistory {
    fn from_loaded(mut snapshots: Vec<ScanSnapshot>) -> Self {
        if snapshots.len() > HISTORY_CAP {
            snapshots.drain(..snapshots.len() - HISTORY_CAP);
        }
        TargetHistory { snapshots: snapshots.into(), removed: false }
    }

    fn push(&mut self, snapshot: ScanSnapshot) {
        self.snapshots.push_back(snapshot);
        while self.snapshots.len() > HISTORY_CAP {
            self.snapshots.pop_front();
        }
    }

    fn latest_diff(&self) -> DifferenceSet {
        let Some(current) = self.snapshots.back() else { return DifferenceSet::default() };
        let previous = self.snapshots.len().checked_sub(2).and_then(|i| self.snapshots.get(i));
        scanwatch_core::diff(previous, current)
    }
}

/// A target's history as it was when a scan started. Recording through it
/// fails if the target has been removed since, even when a target of the
/// same name was added again.
pub struct ScanTicket {
    name: String,
    entry: Arc<Mutex<TargetHistory>>,
}

impl ScanTicket {
    pub fn name(&self) -> &str { &self.name }
}

/// Lock order: a target's history entry may be held while taking `configs`,
/// and `configs` while taking `unusable`, never the other way round.
pub struct HistoryStore {
    layout: Layout,
    configs: Mutex<BTreeMap<String, TargetConfig>>,
    /// Config records that failed to load, written back untouched.
    unusable: Mutex<BTreeMap<String, Value>>,
    histories: Mutex<HashMap<String, Arc<Mutex<TargetHistory>>>>,
}

#[derive(Serialize)]
struct ConfigFile<'a> {
    #[serde(flatten)]
    targets: &'a BTreeMap<String, TargetConfig>,
    #[serde(flatten)]
    unusable: &'a BTreeMap<String, Value>,
}

impl HistoryStore {
    pub fn layout(&self) -> &Layout { &self.layout }

    fn configs(&self) -> MutexGuard<'_, BTreeMap<String, TargetConfig>> {
        self.configs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn unusable(&self) -> MutexGuard<'_, BTreeMap<String, Value>> {
        self.unusable.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn histories(&self) -> MutexGuard<'_, HashMap<String, Arc<Mutex<TargetHistory>>>> {
        self.histories.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn entry(&self, name: &str) -> Option<Arc<Mutex<TargetHistory>>> { self.histories().get(name).cloned() }

    fn persist_configs(&self, configs: &BTreeMap<String, TargetConfig>) -> Result<(), StoreError> {
        let unusable = self.unusable();
        layout::write_json(&self.layout.config_path(), &ConfigFile { targets: configs, unusable: &unusable })
    }

    fn persist_history(&self, name: &str, history: &TargetHistory) -> Result<(), StoreError> {
        layout::write_json(&self.layout.history_path(name), &history.snapshots)
    }
}

fn lock(entry: &Mutex<TargetHistory>) -> MutexGuard<'_, TargetHistory> {
    entry.lock().unwrap_or_else(PoisonError::into_inner)
}
