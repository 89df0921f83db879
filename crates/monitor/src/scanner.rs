//! The seam between the monitor and whatever actually performs a scan.

use async_trait::async_trait;
use history_store::{failed_path, Layout};
use nmap_scan::{build_command, parse_report, run_process, BuildOptions};
use scanwatch_core::{ScanSnapshot, TargetConfig};
use serde::Serialize;
use std::fmt;
use std::path::Path;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, warn};
use uuid::Uuid;

/// What went wrong with one scan execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScanFailure {
    /// The configuration could not be turned into a command line.
    Build,
    /// The scanner executable could not be started.
    Spawn,
    /// The scanner exited unsuccessfully.
    Exit,
    /// The scanner exited cleanly but left no report behind.
    MissingArtifact,
    Parse,
    /// The target was removed or never existed.
    Target,
    /// The result could not be written to disk. Not fatal.
    Persistence,
}

impl fmt::Display for ScanFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ScanFailure::Build => "invalid scan configuration",
            ScanFailure::Spawn => "scanner could not be started",
            ScanFailure::Exit => "scanner failed",
            ScanFailure::MissingArtifact => "scan report missing",
            ScanFailure::Parse => "scan report unreadable",
            ScanFailure::Target => "unknown target",
            ScanFailure::Persistence => "could not save scan results",
        })
    }
}

#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct ScanError {
    pub kind: ScanFailure,
    pub message: String,
}

impl ScanError {
    pub fn new(kind: ScanFailure, message: impl Into<String>) -> Self { ScanError { kind, message: message.into() } }
}

/// Runs one scan of one target and returns its parsed snapshot.
#[async_trait]
pub trait Scanner: Send + Sync {
    async fn scan(&self, name: &str, config: &TargetConfig) -> Result<ScanSnapshot, ScanError>;
}

/// Unreadable reports kept per target for inspection.
pub const KEPT_FAILED_REPORTS: usize = 3;

/// Runs the nmap executable and reads its XML report.
pub struct NmapScanner {
    layout: Layout,
    options: BuildOptions,
    keep_artifacts: bool,
}

impl NmapScanner {
    pub fn new(layout: Layout, options: BuildOptions) -> Self { NmapScanner { layout, options, keep_artifacts: false } }

    /// Leave report files in the data directory after a successful parse.
    pub fn keep_artifacts(mut self, keep: bool) -> Self {
        self.keep_artifacts = keep;
        self
    }

    fn discard(&self, path: &Path) {
        if let Err(e) = std::fs::remove_file(path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %path.display(), error = %e, "could not remove scan report");
            }
        }
    }

    /// Rename an unreadable report out of the way and drop the oldest ones
    /// beyond [`KEPT_FAILED_REPORTS`].
    fn set_aside(&self, name: &str, report: &Path) {
        let kept = failed_path(report);
        if let Err(e) = std::fs::rename(report, &kept) {
            warn!(path = %report.display(), error = %e, "could not set aside unreadable report");
            self.discard(report);
        }
        let failed = self.layout.failed_reports(name);
        let excess = failed.len().saturating_sub(KEPT_FAILED_REPORTS);
        for old in &failed[..excess] {
            self.discard(old);
        }
    }
}

#[async_trait]
impl Scanner for NmapScanner {
    async fn scan(&self, name: &str, config: &TargetConfig) -> Result<ScanSnapshot, ScanError> {
        let tag = format!("{}_{}", OffsetDateTime::now_utc().unix_timestamp(), Uuid::now_v7());
        let artifact = self.layout.artifact_path(name, &tag);
        let command = build_command(config, &self.options, &artifact)
            .map_err(|e| ScanError::new(ScanFailure::Build, format!("{name}: {e}")))?;
        debug!(target_name = %name, command = %command, "running scan");

        let output = run_process(&command).await.map_err(|e| {
            let kind = if e.is_not_found() { ScanFailure::Spawn } else { ScanFailure::Exit };
            ScanError::new(kind, format!("{name}: {e}"))
        })?;
        if !output.success() {
            self.discard(&artifact);
            let code = output.code.map_or_else(|| "signal".to_string(), |c| c.to_string());
            return Err(ScanError::new(ScanFailure::Exit, format!("{name}: exit status {code}: {}", output.tail(5))));
        }
        if !artifact.exists() {
            return Err(ScanError::new(
                ScanFailure::MissingArtifact,
                format!("{name}: no report at {}", artifact.display()),
            ));
        }

        let path = artifact.clone();
        let label = name.to_string();
        let parsed = tokio::task::spawn_blocking(move || parse_report(&path, &label))
            .await
            .map_err(|e| ScanError::new(ScanFailure::Parse, format!("{name}: {e}")))?;
        let snapshot = match parsed {
            Ok(snapshot) => snapshot,
            Err(e) => {
                self.set_aside(name, &artifact);
                return Err(ScanError::new(ScanFailure::Parse, format!("{name}: {e}")));
            }
        };
        if !self.keep_artifacts {
            self.discard(&artifact);
            for old in self.layout.failed_reports(name) {
                self.discard(&old);
            }
        }
        Ok(snapshot)
    }
}
