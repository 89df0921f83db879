//! Counts and per-host views derived from snapshots.

use crate::model::ScanSnapshot;
use serde::Serialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SnapshotStats {
    pub hosts: usize,
    pub live_hosts: usize,
    pub ports: usize,
    pub open_ports: usize,
}

impl SnapshotStats {
    pub fn of(snapshot: &ScanSnapshot) -> Self {
        SnapshotStats {
            hosts: snapshot.hosts.len(),
            live_hosts: snapshot.live_hosts().count(),
            ports: snapshot.port_count(),
            open_ports: snapshot.open_port_count(),
        }
    }
}

/// Host and port counts of the newest snapshot next to the one before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatsDelta {
    pub total_scans: usize,
    pub previous: SnapshotStats,
    pub latest: SnapshotStats,
}

impl StatsDelta {
    pub fn from_history(history: &[ScanSnapshot]) -> Option<Self> {
        let (latest, rest) = history.split_last()?;
        let previous = rest.last().map(SnapshotStats::of).unwrap_or_default();
        Some(StatsDelta { total_scans: history.len(), previous, latest: SnapshotStats::of(latest) })
    }

    pub fn host_change(&self) -> i64 { self.latest.hosts as i64 - self.previous.hosts as i64 }

    pub fn port_change(&self) -> i64 { self.latest.ports as i64 - self.previous.ports as i64 }
}

/// One row of the current-assets view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Asset {
    pub ip: String,
    pub status: String,
    pub open_ports: Vec<String>,
    pub services: Vec<String>,
}

pub fn assets(snapshot: &ScanSnapshot) -> Vec<Asset> {
    snapshot
        .hosts
        .iter()
        .map(|h| Asset {
            ip: h.ip.clone(),
            status: h.status.to_string(),
            open_ports: h.open_ports().map(|p| p.key()).collect(),
            services: h.open_ports().filter_map(|p| p.service.clone()).collect(),
        })
        .collect()
}
