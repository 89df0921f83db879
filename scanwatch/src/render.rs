//! Text and JSON renderings of targets, histories, diffs and events.

use crate::OutputFormat;
use anyhow::Result;
use monitor::MonitorEvent;
use scanwatch_core::stats::{assets, Asset, SnapshotStats, StatsDelta};
use scanwatch_core::{DifferenceSet, ScanSnapshot, TargetConfig};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;

fn emit<T: Serialize>(value: &T, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
        _ => println!("{}", serde_json::to_string(value)?),
    }
    Ok(())
}

fn emit_lines<T: Serialize>(items: &[T], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Jsonl => {
            for item in items {
                println!("{}", serde_json::to_string(item)?);
            }
            Ok(())
        }
        _ => emit(&items, format),
    }
}

#[derive(Serialize)]
struct TargetRow<'a> {
    name: &'a str,
    #[serde(flatten)]
    config: &'a TargetConfig,
}

pub fn targets(configs: &BTreeMap<String, TargetConfig>, running: &[String], format: OutputFormat) -> Result<()> {
    if format != OutputFormat::Text {
        let rows: Vec<TargetRow> = configs.iter().map(|(name, config)| TargetRow { name, config }).collect();
        return emit_lines(&rows, format);
    }
    if configs.is_empty() {
        println!("no targets");
        return Ok(());
    }
    for (name, c) in configs {
        let state = match (c.enabled, running.contains(name)) {
            (_, true) => "running",
            (true, false) => "enabled",
            (false, false) => "disabled",
        };
        println!(
            "{name:<16} {:<20} {:<9} every {:>4}m  {state:<8} last scan: {}",
            c.target,
            c.scan_type,
            c.interval_minutes,
            c.last_scan_time.as_deref().unwrap_or("never")
        );
    }
    Ok(())
}

/// Trend line in the form `total scans: N, hosts a -> b (+d), ports a -> b (+d)`.
pub fn trend_line(delta: &StatsDelta) -> String {
    format!(
        "total scans: {}, hosts {} -> {} ({:+}), ports {} -> {} ({:+})",
        delta.total_scans,
        delta.previous.hosts,
        delta.latest.hosts,
        delta.host_change(),
        delta.previous.ports,
        delta.latest.ports,
        delta.port_change()
    )
}

pub fn history(name: &str, snapshots: &[ScanSnapshot], format: OutputFormat) -> Result<()> {
    if format != OutputFormat::Text {
        return emit_lines(snapshots, format);
    }
    if snapshots.is_empty() {
        println!("{name}: no scans recorded");
        return Ok(());
    }
    for s in snapshots {
        let st = SnapshotStats::of(s);
        println!(
            "{}  hosts {:>4} (up {:>4})  ports {:>5} (open {:>5})",
            s.timestamp, st.hosts, st.live_hosts, st.ports, st.open_ports
        );
    }
    if let Some(delta) = StatsDelta::from_history(snapshots) {
        println!("{}", trend_line(&delta));
    }
    Ok(())
}

/// Human-readable summary of a difference set, one line per change.
pub fn diff_text(d: &DifferenceSet) -> String {
    if d.is_empty() {
        return "no changes\n".to_string();
    }
    let mut out = String::new();
    for (title, items) in [
        ("new hosts", &d.new_hosts),
        ("disappeared hosts", &d.disappeared_hosts),
        ("new ports", &d.new_ports),
        ("disappeared ports", &d.disappeared_ports),
    ] {
        if items.is_empty() {
            continue;
        }
        let _ = writeln!(out, "{title} ({}):", items.len());
        for item in items {
            let _ = writeln!(out, "  {item}");
        }
    }
    if !d.changed_services.is_empty() {
        let _ = writeln!(out, "changed services ({}):", d.changed_services.len());
        for c in &d.changed_services {
            let _ = writeln!(out, "  {}:{}  {} -> {}", c.host, c.port, c.old_service, c.new_service);
        }
    }
    out
}

pub fn diff(name: &str, d: &DifferenceSet, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => {
            println!("{name}:");
            print!("{}", diff_text(d));
            Ok(())
        }
        _ => emit(d, format),
    }
}

pub fn current_assets(snapshot: &ScanSnapshot, format: OutputFormat) -> Result<()> {
    let rows = assets(snapshot);
    if format != OutputFormat::Text {
        return emit_lines(&rows, format);
    }
    println!("{} ({})", snapshot.target_name, snapshot.timestamp);
    for a in &rows {
        println!("{:<40} {:<8} {:<30} {}", a.ip, a.status, a.open_ports.join(","), a.services.join(","));
    }
    Ok(())
}

pub fn write_assets_csv(rows: &[Asset], path: &Path) -> Result<()> {
    let mut w = csv::Writer::from_path(path)?;
    w.write_record(["ip", "status", "open_ports", "services"])?;
    for a in rows {
        w.write_record([a.ip.as_str(), a.status.as_str(), a.open_ports.join(";").as_str(), a.services.join(";").as_str()])?;
    }
    w.flush()?;
    Ok(())
}

pub fn event(ev: &MonitorEvent, format: OutputFormat) -> Result<()> {
    if format != OutputFormat::Text {
        return emit(ev, OutputFormat::Jsonl);
    }
    match ev {
        MonitorEvent::Progress { target_name, message, at } => println!("[{at}] {target_name}: {message}"),
        MonitorEvent::Completed { target_name, snapshot, differences, at } => {
            let st = SnapshotStats::of(snapshot);
            println!(
                "[{at}] {target_name}: scan completed, {} hosts up, {} open ports, {} changes",
                st.live_hosts,
                st.open_ports,
                differences.total()
            );
            if !differences.is_empty() {
                for line in diff_text(differences).lines() {
                    println!("    {line}");
                }
            }
        }
        MonitorEvent::Error { target_name, kind, message, at } => eprintln!("[{at}] {target_name}: {kind}: {message}"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use scanwatch_core::{HostRecord, HostStatus, PortRecord, PortState, ServiceChange};

    #[test]
    fn trend_line_shows_signed_changes() {
        let small = ScanSnapshot::new("lab", "t1").with_host(HostRecord::new("a", HostStatus::Up));
        let big = ScanSnapshot::new("lab", "t2")
            .with_host(HostRecord::new("a", HostStatus::Up).with_port(PortRecord::new(22, "tcp", PortState::Open)))
            .with_host(HostRecord::new("b", HostStatus::Up));
        let delta = StatsDelta::from_history(&[big.clone(), small.clone()]).unwrap();
        assert_eq!(trend_line(&delta), "total scans: 2, hosts 2 -> 1 (-1), ports 1 -> 0 (-1)");
        let delta = StatsDelta::from_history(&[small, big]).unwrap();
        assert_eq!(trend_line(&delta), "total scans: 2, hosts 1 -> 2 (+1), ports 0 -> 1 (+1)");
    }

    #[test]
    fn diff_text_lists_sections() {
        assert_eq!(diff_text(&DifferenceSet::default()), "no changes\n");
        let d = DifferenceSet {
            new_hosts: vec!["10.0.0.2".into()],
            changed_services: vec![ServiceChange {
                host: "10.0.0.1".into(),
                port: "22/tcp".into(),
                old_service: "ssh 7.4".into(),
                new_service: "ssh 8.9".into(),
            }],
            ..Default::default()
        };
        let text = diff_text(&d);
        assert!(text.contains("new hosts (1):\n  10.0.0.2\n"));
        assert!(text.contains("10.0.0.1:22/tcp  ssh 7.4 -> ssh 8.9"));
        assert!(!text.contains("disappeared"));
    }

    #[test]
    fn csv_export_has_one_row_per_host() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("assets.csv");
        let snap = ScanSnapshot::new("lab", "t").with_host(
            HostRecord::new("10.0.0.1", HostStatus::Up)
                .with_port(PortRecord::new(22, "tcp", PortState::Open).with_service("ssh", ""))
                .with_port(PortRecord::new(80, "tcp", PortState::Open).with_service("http", "")),
        );
        write_assets_csv(&assets(&snap), &path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "ip,status,open_ports,services\n10.0.0.1,up,22/tcp;80/tcp,ssh;http\n");
    }
}
