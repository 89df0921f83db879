//! Differences between consecutive snapshots of one target.

use crate::model::{HostRecord, PortRecord, ScanSnapshot};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceChange {
    pub host: String,
    /// `"port/protocol"`
    pub port: String,
    pub old_service: String,
    pub new_service: String,
}

/// Host and port churn between two snapshots. Entries are sorted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DifferenceSet {
    pub new_hosts: Vec<String>,
    pub disappeared_hosts: Vec<String>,
    /// `"ip:port/protocol"`
    pub new_ports: Vec<String>,
    pub disappeared_ports: Vec<String>,
    pub changed_services: Vec<ServiceChange>,
}

impl DifferenceSet {
    pub fn is_empty(&self) -> bool { self.total() == 0 }

    pub fn total(&self) -> usize {
        self.new_hosts.len()
            + self.disappeared_hosts.len()
            + self.new_ports.len()
            + self.disappeared_ports.len()
            + self.changed_services.len()
    }
}

/// Diff the newest entry of a history against the one before it.
pub fn diff_latest(history: &[ScanSnapshot]) -> DifferenceSet {
    match history {
        [] => DifferenceSet::default(),
        [only] => diff(None, only),
        [.., previous, current] => diff(Some(previous), current),
    }
}

/// Without a previous snapshot every live host and its open ports count as new.
pub fn diff(previous: Option<&ScanSnapshot>, current: &ScanSnapshot) -> DifferenceSet {
    match previous {
        None => bootstrap(current),
        Some(prev) => compare(prev, current),
    }
}

fn bootstrap(current: &ScanSnapshot) -> DifferenceSet {
    let mut out = DifferenceSet::default();
    for host in current.live_hosts() {
        out.new_hosts.push(host.ip.clone());
        for port in host.open_ports() {
            out.new_ports.push(endpoint(&host.ip, &port.key()));
        }
    }
    out.new_hosts.sort();
    out.new_hosts.dedup();
    out.new_ports.sort();
    out.new_ports.dedup();
    out
}

fn compare(previous: &ScanSnapshot, current: &ScanSnapshot) -> DifferenceSet {
    let prev_hosts = by_ip(previous);
    let cur_hosts = by_ip(current);
    let mut out = DifferenceSet::default();

    out.new_hosts = cur_hosts.keys().filter(|ip| !prev_hosts.contains_key(*ip)).map(|ip| ip.to_string()).collect();
    out.disappeared_hosts = prev_hosts.keys().filter(|ip| !cur_hosts.contains_key(*ip)).map(|ip| ip.to_string()).collect();

    for (ip, cur_host) in &cur_hosts {
        let Some(prev_host) = prev_hosts.get(ip) else { continue };
        let cur_open = open_by_key(cur_host);
        let prev_open = open_by_key(prev_host);

        for (key, port) in &cur_open {
            match prev_open.get(key) {
                None => out.new_ports.push(endpoint(ip, key)),
                Some(old) if service_differs(old, port) => {
                    out.changed_services.push(ServiceChange {
                        host: ip.to_string(),
                        port: key.clone(),
                        old_service: old.service_label(),
                        new_service: port.service_label(),
                    });
                }
                Some(_) => {}
            }
        }
        for key in prev_open.keys().filter(|k| !cur_open.contains_key(*k)) {
            out.disappeared_ports.push(endpoint(ip, key));
        }
    }
    out
}

fn by_ip(snapshot: &ScanSnapshot) -> BTreeMap<&str, &HostRecord> {
    snapshot.hosts.iter().map(|h| (h.ip.as_str(), h)).collect()
}

fn open_by_key(host: &HostRecord) -> BTreeMap<String, &PortRecord> {
    host.open_ports().map(|p| (p.key(), p)).collect()
}

fn service_differs(old: &PortRecord, new: &PortRecord) -> bool {
    old.service_name() != new.service_name() || old.version.as_deref().unwrap_or("") != new.version.as_deref().unwrap_or("")
}

fn endpoint(ip: &str, key: &str) -> String { format!("{ip}:{key}") }
