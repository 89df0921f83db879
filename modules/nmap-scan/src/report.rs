//! Streaming reader for nmap's `-oX` report format.

use scanwatch_core::{now_rfc3339, HostRecord, HostStatus, PortRecord, PortState, ScanSnapshot};
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;
use xml::attribute::OwnedAttribute;
use xml::reader::{EventReader, XmlEvent};

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("cannot read report {}: {}", .path.display(), .source)]
    Io { path: PathBuf, source: std::io::Error },
    #[error("malformed report: {0}")]
    Xml(#[from] xml::reader::Error),
    #[error("not an nmap report (root element <{0}>)")]
    NotAReport(String),
    #[error("report ended before </nmaprun>")]
    Truncated,
}

/// Parse the report at `path` into a snapshot stamped with the current time.
pub fn parse_report(path: &Path, target_name: &str) -> Result<ScanSnapshot, ParseError> {
    let file = File::open(path).map_err(|source| ParseError::Io { path: path.to_path_buf(), source })?;
    let hosts = parse_hosts(BufReader::new(file))?;
    debug!(target_name = %target_name, hosts = hosts.len(), path = %path.display(), "report parsed");
    Ok(ScanSnapshot { timestamp: now_rfc3339(), target_name: target_name.to_string(), hosts })
}

pub fn parse_str(xml: &str, target_name: &str) -> Result<ScanSnapshot, ParseError> {
    let hosts = parse_hosts(xml.as_bytes())?;
    Ok(ScanSnapshot { timestamp: now_rfc3339(), target_name: target_name.to_string(), hosts })
}

#[derive(Default)]
struct PendingHost {
    addresses: Vec<(String, String)>,
    status: HostStatus,
    ports: Vec<PortRecord>,
}

impl PendingHost {
    /// First ipv4/ipv6 address, otherwise whatever address came first (mac).
    fn into_record(self) -> Option<HostRecord> {
        let ip = self
            .addresses
            .iter()
            .find(|(kind, _)| kind == "ipv4" || kind == "ipv6")
            .or_else(|| self.addresses.first())
            .map(|(_, addr)| addr.clone())?;
        Some(HostRecord { ip, status: self.status, ports: self.ports })
    }
}

/// Collect every `<host>` of an nmap XML document.
pub fn parse_hosts<R: Read>(reader: R) -> Result<Vec<HostRecord>, ParseError> {
    let mut hosts = Vec::new();
    let mut seen = HashSet::new();
    let mut host: Option<PendingHost> = None;
    let mut port: Option<PortRecord> = None;
    let mut root_seen = false;
    let mut closed = false;

    for event in EventReader::new(reader) {
        match event? {
            XmlEvent::StartElement { name, attributes, .. } => {
                let tag = name.local_name.as_str();
                if !root_seen {
                    if tag != "nmaprun" {
                        return Err(ParseError::NotAReport(tag.to_string()));
                    }
                    root_seen = true;
                    continue;
                }
                let Some(h) = host.as_mut() else {
                    if tag == "host" {
                        host = Some(PendingHost::default());
                    }
                    continue;
                };
                match tag {
                    "address" if port.is_none() => {
                        if let Some(addr) = attr(&attributes, "addr") {
                            let kind = attr(&attributes, "addrtype").unwrap_or("ipv4");
                            h.addresses.push((kind.to_string(), addr.to_string()));
                        }
                    }
                    "status" if port.is_none() => h.status = HostStatus::from(attr(&attributes, "state").unwrap_or_default()),
                    "port" if port.is_none() => port = start_port(&attributes),
                    "state" => {
                        if let Some(p) = port.as_mut() {
                            p.state = PortState::from(attr(&attributes, "state").unwrap_or_default());
                        }
                    }
                    "service" => {
                        if let Some(p) = port.as_mut() {
                            p.service = non_empty(attr(&attributes, "name"));
                            p.version = non_empty(attr(&attributes, "version"));
                        }
                    }
                    _ => {}
                }
            }
            XmlEvent::EndElement { name } => match name.local_name.as_str() {
                "port" => {
                    if let (Some(h), Some(p)) = (host.as_mut(), port.take()) {
                        h.ports.push(p);
                    }
                }
                "host" => {
                    port = None;
                    match host.take().and_then(PendingHost::into_record) {
                        Some(record) if seen.insert(record.ip.clone()) => hosts.push(record),
                        Some(record) => debug!(ip = %record.ip, "duplicate host entry ignored"),
                        None => debug!("host without address ignored"),
                    }
                }
                "nmaprun" => closed = true,
                _ => {}
            },
            _ => {}
        }
    }

    if !root_seen {
        return Err(ParseError::NotAReport(String::new()));
    }
    if !closed {
        return Err(ParseError::Truncated);
    }
    Ok(hosts)
}

/// `None` for ports whose number is unusable; those are skipped.
fn start_port(attributes: &[OwnedAttribute]) -> Option<PortRecord> {
    let number = attr(attributes, "portid")?.parse::<u16>().ok()?;
    let protocol = attr(attributes, "protocol").filter(|p| !p.is_empty()).unwrap_or("tcp");
    Some(PortRecord::new(number, protocol, PortState::Unknown))
}

fn non_empty(value: Option<&str>) -> Option<String> { value.filter(|v| !v.is_empty()).map(str::to_string) }

fn attr<'a>(attributes: &'a [OwnedAttribute], key: &str) -> Option<&'a str> {
    attributes.iter().find(|a| a.name.local_name == key).map(|a| a.value.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPORT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE nmaprun>
<nmaprun scanner="nmap" args="nmap -sV -oX out.xml 10.0.0.0/30" version="7.94">
<scaninfo type="syn" protocol="tcp" numservices="2" services="22,80"/>
<host starttime="1" endtime="2">
  <status state="up" reason="arp-response"/>
  <address addr="00:11:22:33:44:55" addrtype="mac" vendor="Acme"/>
  <address addr="10.0.0.1" addrtype="ipv4"/>
  <hostnames><hostname name="gw.lan" type="PTR"/></hostnames>
  <ports>
    <extraports state="closed" count="998"/>
    <port protocol="tcp" portid="22">
      <state state="open" reason="syn-ack"/>
      <service name="ssh" product="OpenSSH" version=" 8.9p1 " method="probed"/>
    </port>
    <port protocol="tcp" portid="80">
      <state state="closed" reason="reset"/>
    </port>
    <port protocol="udp" portid="53">
      <state state="open|filtered" reason="no-response"/>
      <service name="domain" method="table"/>
    </port>
  </ports>
</host>
<host><status state="down"/><address addr="10.0.0.2" addrtype="ipv4"/></host>
<host><status state="up"/><ports><port protocol="tcp" portid="1"><state state="open"/></port></ports></host>
<host><status state="down"/><address addr="10.0.0.1" addrtype="ipv4"/></host>
<runstats><finished time="3"/><hosts up="1" down="1" total="2"/></runstats>
</nmaprun>
"#;

    #[test]
    fn reads_hosts_ports_and_services() {
        let snap = parse_str(REPORT, "lab").unwrap();
        assert_eq!(snap.target_name, "lab");
        assert_eq!(snap.hosts.len(), 2);

        let gw = snap.host("10.0.0.1").unwrap();
        assert!(gw.is_up());
        assert_eq!(gw.ports.len(), 3);
        assert_eq!(gw.ports[0].key(), "22/tcp");
        assert_eq!(gw.ports[0].state, PortState::Open);
        assert_eq!(gw.ports[0].service.as_deref(), Some("ssh"));
        assert_eq!(gw.ports[0].version.as_deref(), Some("8.9p1"));
        assert_eq!(gw.ports[1].state, PortState::Closed);
        assert_eq!(gw.ports[1].service, None);
        assert_eq!(gw.ports[2].key(), "53/udp");
        assert_eq!(gw.ports[2].state, PortState::Unknown);
        assert_eq!(gw.ports[2].version, None);

        assert_eq!(snap.host("10.0.0.2").unwrap().status, HostStatus::Down);
    }

    #[test]
    fn falls_back_to_non_ip_address() {
        let xml = r#"<nmaprun><host><status state="up"/><address addr="aa:bb" addrtype="mac"/></host></nmaprun>"#;
        let hosts = parse_hosts(xml.as_bytes()).unwrap();
        assert_eq!(hosts[0].ip, "aa:bb");
    }

    #[test]
    fn empty_report_has_no_hosts() {
        let hosts = parse_hosts(r#"<nmaprun scanner="nmap"><runstats/></nmaprun>"#.as_bytes()).unwrap();
        assert!(hosts.is_empty());
    }

    #[test]
    fn rejects_malformed_documents() {
        assert!(matches!(parse_hosts("<html><body/></html>".as_bytes()), Err(ParseError::NotAReport(r)) if r == "html"));
        assert!(matches!(parse_hosts("".as_bytes()), Err(ParseError::Xml(_)) | Err(ParseError::NotAReport(_))));
        assert!(matches!(parse_hosts("<nmaprun><host>".as_bytes()), Err(ParseError::Xml(_)) | Err(ParseError::Truncated)));
        assert!(parse_hosts("<nmaprun><host></nmaprun>".as_bytes()).is_err());
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = parse_report(&dir.path().join("absent.xml"), "lab").unwrap_err();
        assert!(matches!(err, ParseError::Io { .. }));
    }

    #[test]
    fn parses_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.xml");
        std::fs::write(&path, REPORT).unwrap();
        let snap = parse_report(&path, "lab").unwrap();
        assert_eq!(snap.open_port_count(), 1);
        assert!(!snap.timestamp.is_empty());
    }
}
