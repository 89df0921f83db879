use crate::StoreError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "monitor_configs.json";

/// File names under the data directory: one config file for all targets and
/// one history file per target.
#[derive(Debug, Clone)]
pub struct Layout {
    root: PathBuf,
}

impl Layout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Layout { root: root.into() }
    }

    pub fn config_path(&self) -> PathBuf { self.root.join(CONFIG_FILE) }

    pub fn history_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{}_history.json", file_stem(name)))
    }

    /// Where a scanner should write the raw report of one run.
    pub fn artifact_path(&self, name: &str, tag: &str) -> PathBuf {
        self.root.join(format!("{}_{}.xml", file_stem(name), tag))
    }

    /// Reports left behind for `name`, matching `<stem>_<unix-ts>_<uuid>.xml`,
    /// including those set aside as unreadable.
    pub fn artifacts(&self, name: &str) -> Vec<PathBuf> {
        self.reports(name).into_iter().map(|r| r.path).collect()
    }

    /// Unreadable reports set aside for `name`, oldest first.
    pub fn failed_reports(&self, name: &str) -> Vec<PathBuf> {
        let mut failed: Vec<Report> = self.reports(name).into_iter().filter(|r| r.failed).collect();
        failed.sort_by(|a, b| (a.started, &a.id).cmp(&(b.started, &b.id)));
        failed.into_iter().map(|r| r.path).collect()
    }

    fn reports(&self, name: &str) -> Vec<Report> {
        let prefix = format!("{}_", file_stem(name));
        let Ok(entries) = fs::read_dir(&self.root) else { return Vec::new() };
        entries
            .filter_map(Result::ok)
            .filter_map(|e| {
                let file = e.file_name();
                let tag = file.to_str()?.strip_prefix(&prefix)?;
                let (tag, failed) = match tag.strip_suffix(FAILED_SUFFIX) {
                    Some(t) => (t, true),
                    None => (tag.strip_suffix(".xml")?, false),
                };
                let (ts, id) = tag.split_once('_')?;
                if ts.is_empty() || !ts.bytes().all(|b| b.is_ascii_digit()) || id.len() != 36 {
                    return None;
                }
                Some(Report { path: e.path(), started: ts.parse().ok()?, id: id.to_string(), failed })
            })
            .collect()
    }
}

const FAILED_SUFFIX: &str = ".failed.xml";

/// Where an unreadable report is set aside: `x.xml` becomes `x.failed.xml`.
pub fn failed_path(report: &Path) -> PathBuf { report.with_extension("failed.xml") }

struct Report {
    path: PathBuf,
    started: u64,
    id: String,
    failed: bool,
}

/// Target names are user input; keep them from escaping the data directory.
pub fn file_stem(name: &str) -> String {
    let stem: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') { c } else { '_' })
        .collect();
    if stem.is_empty() || stem.chars().all(|c| c == '.') { format!("_{stem}") } else { stem }
}

/// `Ok(None)` when the file does not exist.
pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    let bytes = match fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(source) => return Err(StoreError::Io { path: path.to_path_buf(), source }),
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|source| StoreError::Json { path: path.to_path_buf(), source })
}

/// Written to a sibling temp file first so a crash never leaves a half-written file.
pub(crate) fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StoreError> {
    let bytes = serde_json::to_vec_pretty(value).map_err(|source| StoreError::Json { path: path.to_path_buf(), source })?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, bytes).map_err(|source| StoreError::Io { path: tmp.clone(), source })?;
    fs::rename(&tmp, path).map_err(|source| StoreError::Io { path: path.to_path_buf(), source })
}

pub(crate) fn remove_file(path: &Path) -> Result<(), StoreError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(source) => Err(StoreError::Io { path: path.to_path_buf(), source }),
    }
}
