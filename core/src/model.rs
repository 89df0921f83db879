//! Normalized representation of one scan's findings.
//!
//! Missing service names and versions are `None` in memory. On the JSON
//! boundary they are written as the `"unknown"` and `""` sentinels, and port
//! numbers as strings, so history files stay readable by older tooling.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Service name written for a port whose service could not be identified.
pub const UNKNOWN_SERVICE: &str = "unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum HostStatus {
    Up,
    Down,
    #[default]
    Unknown,
}

impl HostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HostStatus::Up => "up",
            HostStatus::Down => "down",
            HostStatus::Unknown => "unknown",
        }
    }
}

impl From<&str> for HostStatus {
    fn from(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "up" => HostStatus::Up,
            "down" => HostStatus::Down,
            _ => HostStatus::Unknown,
        }
    }
}

impl From<String> for HostStatus {
    fn from(s: String) -> Self { HostStatus::from(s.as_str()) }
}

impl From<HostStatus> for String {
    fn from(s: HostStatus) -> Self { s.as_str().to_string() }
}

impl fmt::Display for HostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// Port state. Composite nmap states such as `open|filtered` are not `Open`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PortState {
    Open,
    Closed,
    Filtered,
    #[default]
    Unknown,
}

impl PortState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PortState::Open => "open",
            PortState::Closed => "closed",
            PortState::Filtered => "filtered",
            PortState::Unknown => "unknown",
        }
    }
}

impl From<&str> for PortState {
    fn from(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "open" => PortState::Open,
            "closed" => PortState::Closed,
            "filtered" => PortState::Filtered,
            _ => PortState::Unknown,
        }
    }
}

impl From<String> for PortState {
    fn from(s: String) -> Self { PortState::from(s.as_str()) }
}

impl From<PortState> for String {
    fn from(s: PortState) -> Self { s.as_str().to_string() }
}

impl fmt::Display for PortState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortRecord {
    #[serde(with = "port_number")]
    pub port: u16,
    #[serde(default = "default_protocol")]
    pub protocol: String,
    #[serde(default)]
    pub state: PortState,
    #[serde(with = "sentinel::service", default)]
    pub service: Option<String>,
    #[serde(with = "sentinel::version", default)]
    pub version: Option<String>,
}

fn default_protocol() -> String { "tcp".to_string() }

impl PortRecord {
    pub fn new(port: u16, protocol: impl Into<String>, state: PortState) -> Self {
        PortRecord { port, protocol: protocol.into(), state, service: None, version: None }
    }

    pub fn with_service(mut self, name: impl Into<String>, version: impl Into<String>) -> Self {
        self.service = non_empty(name.into());
        self.version = non_empty(version.into());
        self
    }

    /// Composite key `"port/protocol"`, unique within a host.
    pub fn key(&self) -> String { format!("{}/{}", self.port, self.protocol) }

    pub fn is_open(&self) -> bool { self.state == PortState::Open }

    pub fn service_name(&self) -> &str { self.service.as_deref().unwrap_or(UNKNOWN_SERVICE) }

    /// `"service version"`, trimmed; an absent version collapses away.
    pub fn service_label(&self) -> String {
        match self.version.as_deref() {
            Some(v) if !v.trim().is_empty() => format!("{} {}", self.service_name(), v).trim().to_string(),
            _ => self.service_name().trim().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostRecord {
    pub ip: String,
    #[serde(default)]
    pub status: HostStatus,
    #[serde(default)]
    pub ports: Vec<PortRecord>,
}

impl HostRecord {
    pub fn new(ip: impl Into<String>, status: HostStatus) -> Self {
        HostRecord { ip: ip.into(), status, ports: Vec::new() }
    }

    pub fn with_port(mut self, port: PortRecord) -> Self {
        self.ports.push(port);
        self
    }

    pub fn is_up(&self) -> bool { self.status == HostStatus::Up }

    pub fn open_ports(&self) -> impl Iterator<Item = &PortRecord> {
        self.ports.iter().filter(|p| p.is_open())
    }
}

/// One completed scan of one target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanSnapshot {
    pub timestamp: String,
    pub target_name: String,
    #[serde(default)]
    pub hosts: Vec<HostRecord>,
}

impl ScanSnapshot {
    pub fn new(target_name: impl Into<String>, timestamp: impl Into<String>) -> Self {
        ScanSnapshot { timestamp: timestamp.into(), target_name: target_name.into(), hosts: Vec::new() }
    }

    pub fn with_host(mut self, host: HostRecord) -> Self {
        self.hosts.push(host);
        self
    }

    pub fn host(&self, ip: &str) -> Option<&HostRecord> { self.hosts.iter().find(|h| h.ip == ip) }

    pub fn live_hosts(&self) -> impl Iterator<Item = &HostRecord> { self.hosts.iter().filter(|h| h.is_up()) }

    pub fn port_count(&self) -> usize { self.hosts.iter().map(|h| h.ports.len()).sum() }

    pub fn open_port_count(&self) -> usize { self.hosts.iter().map(|h| h.open_ports().count()).sum() }
}

fn non_empty(s: String) -> Option<String> {
    let t = s.trim();
    if t.is_empty() { None } else { Some(t.to_string()) }
}

mod port_number {
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(port: &u16, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&port.to_string())
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Num(u64),
        Text(String),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<u16, D::Error> {
        match Raw::deserialize(d)? {
            Raw::Num(n) => u16::try_from(n).map_err(|_| de::Error::custom(format!("port out of range: {n}"))),
            Raw::Text(t) => t.trim().parse::<u16>().map_err(|_| de::Error::custom(format!("invalid port: {t}"))),
        }
    }
}

mod sentinel {
    macro_rules! sentinel_field {
        ($name:ident, $marker:expr) => {
            pub mod $name {
                use serde::{Deserialize, Deserializer, Serializer};

                pub fn serialize<S: Serializer>(v: &Option<String>, s: S) -> Result<S::Ok, S::Error> {
                    s.serialize_str(v.as_deref().unwrap_or($marker))
                }

                pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
                    let raw: Option<String> = Option::deserialize(d)?;
                    Ok(raw.filter(|s| !s.is_empty() && s.as_str() != $marker))
                }
            }
        };
    }

    sentinel_field!(service, crate::model::UNKNOWN_SERVICE);
    sentinel_field!(version, "");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinels_written_at_the_boundary() {
        let p = PortRecord::new(8080, "tcp", PortState::Filtered);
        let v = serde_json::to_value(&p).unwrap();
        assert_eq!(v["port"], "8080");
        assert_eq!(v["service"], "unknown");
        assert_eq!(v["version"], "");
        assert_eq!(v["state"], "filtered");
    }

    #[test]
    fn reads_legacy_history_records() {
        let raw = r#"{"ip":"10.0.0.5","status":"up","ports":[
            {"port":"22","protocol":"tcp","state":"open","service":"ssh","version":"7.4"},
            {"port":443,"state":"open|filtered","service":"unknown","version":""}]}"#;
        let h: HostRecord = serde_json::from_str(raw).unwrap();
        assert!(h.is_up());
        assert_eq!(h.ports[0].key(), "22/tcp");
        assert_eq!(h.ports[0].service_label(), "ssh 7.4");
        assert_eq!(h.ports[1].protocol, "tcp");
        assert_eq!(h.ports[1].state, PortState::Unknown);
        assert_eq!(h.ports[1].service, None);
        assert_eq!(h.ports[1].version, None);
    }

    #[test]
    fn rejects_bad_port_numbers() {
        assert!(serde_json::from_str::<PortRecord>(r#"{"port":"http"}"#).is_err());
        assert!(serde_json::from_str::<PortRecord>(r#"{"port":70000}"#).is_err());
    }

    #[test]
    fn service_label_collapses_empty_parts() {
        let p = PortRecord::new(80, "tcp", PortState::Open).with_service("http", "");
        assert_eq!(p.service_label(), "http");
        let q = PortRecord::new(80, "tcp", PortState::Open);
        assert_eq!(q.service_label(), "unknown");
        let r = PortRecord::new(80, "tcp", PortState::Open).with_service("", "1.2");
        assert_eq!(r.service_label(), "unknown 1.2");
    }

    #[test]
    fn snapshot_counts() {
        let snap = ScanSnapshot::new("lab", "2024-01-01T00:00:00Z")
            .with_host(
                HostRecord::new("10.0.0.1", HostStatus::Up)
                    .with_port(PortRecord::new(22, "tcp", PortState::Open))
                    .with_port(PortRecord::new(23, "tcp", PortState::Closed)),
            )
            .with_host(HostRecord::new("10.0.0.2", HostStatus::Down));
        assert_eq!(snap.port_count(), 2);
        assert_eq!(snap.open_port_count(), 1);
        assert_eq!(snap.live_hosts().count(), 1);
        assert!(snap.host("10.0.0.2").is_some());
    }
}
