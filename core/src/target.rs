//! Monitored target configuration and its validation.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Ports probed when a target does not name its own.
pub const DEFAULT_PORTS: &str = "80,443,22,21,25,53,110,993,995,143";
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_THREADS: u32 = 50;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TargetError {
    #[error("monitor target already exists: {0}")]
    AlreadyExists(String),
    #[error("monitor target not found: {0}")]
    NotFound(String),
    #[error("monitor target is disabled: {0}")]
    Disabled(String),
    #[error("invalid configuration for {name}: {reason}")]
    InvalidConfig { name: String, reason: String },
}

/// Kind of scan run against a target. Configurations written by older
/// tooling name profiles in Chinese; those names are accepted on load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScanProfile {
    /// Host discovery only, no port scan.
    #[serde(alias = "存活扫描")]
    Liveness,
    /// TCP SYN scan of the selected ports.
    #[serde(alias = "默认扫描")]
    Default,
    /// Service and version detection.
    #[serde(alias = "服务识别")]
    Service,
    /// Operating system detection.
    #[serde(alias = "系统识别")]
    Os,
    /// SYN plus version detection, accepts `ip:port` targets.
    #[serde(alias = "端口识别")]
    Port,
    /// Credential brute-force scripts.
    #[serde(alias = "暴力破解")]
    Brute,
    /// Vulnerability scripts.
    #[serde(alias = "漏洞扫描")]
    Vuln,
}

impl ScanProfile {
    pub const ALL: [ScanProfile; 7] = [
        ScanProfile::Liveness,
        ScanProfile::Default,
        ScanProfile::Service,
        ScanProfile::Os,
        ScanProfile::Port,
        ScanProfile::Brute,
        ScanProfile::Vuln,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ScanProfile::Liveness => "liveness",
            ScanProfile::Default => "default",
            ScanProfile::Service => "service",
            ScanProfile::Os => "os",
            ScanProfile::Port => "port",
            ScanProfile::Brute => "brute",
            ScanProfile::Vuln => "vuln",
        }
    }
}

impl fmt::Display for ScanProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for ScanProfile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let t = s.trim().to_ascii_lowercase();
        ScanProfile::ALL
            .into_iter()
            .find(|p| p.as_str() == t)
            .ok_or_else(|| format!("unknown scan profile: {s}"))
    }
}

/// A stored, validated target configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Host, CIDR or hostname expression handed to the scanner.
    pub target: String,
    pub scan_type: ScanProfile,
    pub interval_minutes: u32,
    #[serde(default)]
    pub ports: Option<String>,
    #[serde(default)]
    pub params: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub threads: Option<u32>,
    #[serde(default)]
    pub fast_mode: bool,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    pub created_time: String,
    #[serde(default)]
    pub last_scan_time: Option<String>,
}

fn enabled_by_default() -> bool { true }

impl TargetConfig {
    pub fn interval(&self) -> Duration { Duration::from_secs(u64::from(self.interval_minutes.max(1)) * 60) }

    pub fn ports_or_default(&self) -> &str {
        self.ports.as_deref().filter(|p| !p.trim().is_empty()).unwrap_or(DEFAULT_PORTS)
    }

    pub fn timeout_secs_or_default(&self) -> u64 { self.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS) }

    pub fn threads_or_default(&self) -> u32 { self.threads.unwrap_or(DEFAULT_THREADS).max(1) }
}

/// Unvalidated input of an add-target request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TargetDraft {
    pub target: Option<String>,
    pub scan_type: Option<ScanProfile>,
    pub interval_minutes: Option<u32>,
    #[serde(default)]
    pub ports: Option<String>,
    #[serde(default)]
    pub params: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub threads: Option<u32>,
    #[serde(default)]
    pub fast_mode: bool,
}

impl TargetDraft {
    pub fn new(target: impl Into<String>, scan_type: ScanProfile, interval_minutes: u32) -> Self {
        TargetDraft {
            target: Some(target.into()),
            scan_type: Some(scan_type),
            interval_minutes: Some(interval_minutes),
            ..Default::default()
        }
    }

    /// Check required fields and stamp the result as a new, enabled target.
    pub fn validate(self, name: &str, created_time: String) -> Result<TargetConfig, TargetError> {
        let invalid = |reason: &str| TargetError::InvalidConfig { name: name.to_string(), reason: reason.to_string() };
        if name.trim().is_empty() {
            return Err(invalid("name is empty"));
        }
        let target = self
            .target
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| invalid("missing field: target"))?;
        let scan_type = self.scan_type.ok_or_else(|| invalid("missing field: scan_type"))?;
        let interval_minutes = self.interval_minutes.ok_or_else(|| invalid("missing field: interval_minutes"))?;
        if interval_minutes == 0 {
            return Err(invalid("interval_minutes must be at least 1"));
        }
        Ok(TargetConfig {
            target,
            scan_type,
            interval_minutes,
            ports: self.ports.filter(|p| !p.trim().is_empty()),
            params: self.params.filter(|p| !p.trim().is_empty()),
            timeout_secs: self.timeout_secs,
            threads: self.threads,
            fast_mode: self.fast_mode,
            enabled: true,
            created_time,
            last_scan_time: None,
        })
    }
}
