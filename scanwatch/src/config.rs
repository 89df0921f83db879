use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

pub const DEFAULT_FILE: &str = "scanwatch.yaml";
pub const DEFAULT_DATA_DIR: &str = "monitor_data";

#[derive(Debug, Default, Deserialize, Clone)]
pub struct Config {
    pub data_dir: Option<PathBuf>,
    pub nmap_path: Option<String>,
    /// Holds `users.txt` and `passwords.txt` for the brute profile.
    pub dict_dir: Option<PathBuf>,
    pub keep_artifacts: Option<bool>,
    pub default_ports: Option<String>,
    pub default_params: Option<String>,
    pub default_timeout_secs: Option<u64>,
    pub default_threads: Option<u32>,
}

impl Config {
    pub fn data_dir(&self) -> PathBuf { self.data_dir.clone().unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR)) }

    pub fn nmap_path(&self) -> String { self.nmap_path.clone().unwrap_or_else(|| "nmap".to_string()) }
}

/// Load `path`, or `./scanwatch.yaml` when no path is given. Missing or
/// unreadable files yield `None`.
pub fn load_config(path: Option<&Path>) -> Option<Config> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => {
            let p = Path::new(DEFAULT_FILE);
            if p.exists() { p.to_path_buf() } else { return None; }
        }
    };
    let s = match fs::read_to_string(&path) {
        Ok(s) => s,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "config file not readable");
            return None;
        }
    };
    match serde_yaml::from_str(&s) {
        Ok(cfg) => Some(cfg),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "config file ignored");
            None
        }
    }
}
