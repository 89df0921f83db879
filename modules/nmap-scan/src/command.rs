//! Argument vectors for each scan profile.

use regex::Regex;
use scanwatch_core::{ScanProfile, TargetConfig};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Common service ports used by the port profile when none are given.
pub const COMMON_PORTS: &str = "21,22,23,25,53,80,110,111,135,139,143,443,993,995,1723,3389,5900,8080";
/// Ports of services the brute-force scripts know how to attack.
pub const BRUTE_PORTS: &str = "21,22,23,25,53,80,110,135,139,443,445,993,995,1433,3306,3389,5432,5900";

const BRUTE_SCRIPTS: &[&str] = &[
    "telnet-brute",
    "ssh-brute",
    "smb-brute",
    "ms-sql-brute",
    "mysql-brute",
    "oracle-brute",
    "vnc-brute",
    "mongodb-brute",
    "redis-brute",
    "ftp-brute",
];

const FAST_MODE: &[&str] = &[
    "-n", "--unique", "--min-hostgroup", "512", "--min-parallelism", "10", "--host-timeout", "10m", "--script-timeout", "3m",
];

/// Flags that make no sense for host discovery only.
const LIVENESS_CONFLICTS: &[&str] = &["-sS", "-sT", "-sU", "-sV", "-sA", "-sW", "-sM", "-sO", "-p", "--open"];

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BuildError {
    #[error("empty scan target")]
    EmptyTarget,
    #[error("invalid port expression: {0}")]
    InvalidPorts(String),
}

#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Scanner executable, resolved through PATH when not absolute.
    pub program: String,
    /// Directory holding `users.txt` and `passwords.txt` for brute-force scans.
    pub dict_dir: Option<PathBuf>,
}

impl Default for BuildOptions {
    fn default() -> Self { BuildOptions { program: "nmap".to_string(), dict_dir: None } }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl fmt::Display for ScanCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for a in &self.args {
            write!(f, " {a}")?;
        }
        Ok(())
    }
}

/// Build the scanner invocation for `config`. The argument list always ends
/// with `-oX <output>` so the caller knows where the report lands.
pub fn build_command(config: &TargetConfig, opts: &BuildOptions, output: &Path) -> Result<ScanCommand, BuildError> {
    let mut target = config.target.trim().to_string();
    if target.is_empty() {
        return Err(BuildError::EmptyTarget);
    }
    let ports = config.ports.as_deref().map(str::trim).filter(|p| !p.is_empty());
    if let Some(p) = ports {
        validate_ports(p)?;
    }

    let mut args: Vec<String> = vec!["--min-parallelism".into(), config.threads_or_default().to_string()];
    let timeout = config.timeout_secs_or_default();
    if timeout > 0 {
        push(&mut args, &["--host-timeout", &format!("{timeout}s")]);
    }
    if config.fast_mode {
        push(&mut args, FAST_MODE);
    }

    match config.scan_type {
        ScanProfile::Liveness => push(&mut args, &["-sn", "-PU", "--disable-arp-ping"]),
        ScanProfile::Default => {
            push(&mut args, &["-vvv", "-T4", "-sS", "--open", "-n"]);
            push_ports(&mut args, Some(config.ports_or_default()));
        }
        ScanProfile::Service => {
            push(&mut args, &["-vvv", "-sV", "--open", "-n"]);
            push_ports(&mut args, Some(config.ports_or_default()));
        }
        ScanProfile::Os => push(&mut args, &["-vvv", "-O", "-n"]),
        ScanProfile::Port => {
            push(&mut args, &["-vvv", "-sS", "-sV", "--open"]);
            match split_host_port(&target) {
                Some((host, port)) => {
                    push_ports(&mut args, Some(port.as_str()));
                    target = host;
                }
                None => push_ports(&mut args, Some(ports.unwrap_or(COMMON_PORTS))),
            }
        }
        ScanProfile::Brute => {
            push(&mut args, &["-vvv", "-sV", "--open", "-n"]);
            push_ports(&mut args, Some(ports.unwrap_or(BRUTE_PORTS)));
            match &opts.dict_dir {
                Some(dir) => {
                    args.push(format!("--script={}", BRUTE_SCRIPTS.join(",")));
                    args.push(format!(
                        "--script-args=userdb={},passdb={},brute.firstonly=true",
                        dir.join("users.txt").display(),
                        dir.join("passwords.txt").display()
                    ));
                }
                None => push(&mut args, &["--script", "brute"]),
            }
        }
        ScanProfile::Vuln => {
            push(&mut args, &["-vvv", "--script", "vuln"]);
            push_ports(&mut args, ports);
        }
    }

    if let Some(extra) = config.params.as_deref() {
        append_params(&mut args, extra, config.scan_type == ScanProfile::Liveness);
    }

    args.push(target);
    args.push("-oX".into());
    args.push(output.display().to_string());
    Ok(ScanCommand { program: opts.program.clone(), args })
}

/// Check a port expression such as `22,80,8000-8100` or `T:80,U:53`.
pub fn validate_ports(expr: &str) -> Result<(), BuildError> {
    let invalid = || BuildError::InvalidPorts(expr.to_string());
    let part_re = Regex::new(r"^(?:[TUSP]:)?(\d*)(-?)(\d*)$").map_err(|_| invalid())?;
    let mut seen = false;
    for part in expr.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let caps = part_re.captures(part).ok_or_else(invalid)?;
        let start = parse_port(&caps[1]).map_err(|_| invalid())?;
        let dash = !caps[2].is_empty();
        let end = parse_port(&caps[3]).map_err(|_| invalid())?;
        match (start, dash, end) {
            (None, _, None) => return Err(invalid()),
            (Some(_), false, Some(_)) => return Err(invalid()),
            (Some(s), true, Some(e)) if s > e => return Err(invalid()),
            _ => {}
        }
        seen = true;
    }
    if seen { Ok(()) } else { Err(invalid()) }
}

fn parse_port(s: &str) -> Result<Option<u16>, ()> {
    if s.is_empty() {
        return Ok(None);
    }
    match s.parse::<u16>() {
        Ok(0) | Err(_) => Err(()),
        Ok(p) => Ok(Some(p)),
    }
}

/// `10.0.0.5:8080` style targets. IPv6 literals and URLs are left alone.
fn split_host_port(target: &str) -> Option<(String, String)> {
    if target.contains("://") || target.matches(':').count() != 1 {
        return None;
    }
    let (host, port) = target.split_once(':')?;
    let (host, port) = (host.trim(), port.trim());
    if host.is_empty() || validate_ports(port).is_err() {
        return None;
    }
    Some((host.to_string(), port.to_string()))
}

fn push(args: &mut Vec<String>, items: &[&str]) {
    args.extend(items.iter().map(|s| s.to_string()));
}

fn push_ports(args: &mut Vec<String>, ports: Option<&str>) {
    if let Some(p) = ports {
        push(args, &["-p", p]);
    }
}

/// Append user parameters, treating an option and its value as one unit.
/// A unit already present in `args` is skipped.
fn append_params(args: &mut Vec<String>, extra: &str, liveness: bool) {
    let tokens: Vec<&str> = extra.split_whitespace().collect();
    let mut i = 0;
    while i < tokens.len() {
        let flag = tokens[i];
        let with_value = flag.starts_with('-') && tokens.get(i + 1).is_some_and(|t| is_value(t));
        let unit = &tokens[i..if with_value { i + 2 } else { i + 1 }];
        if liveness && LIVENESS_CONFLICTS.contains(&flag) {
            // only -p owns its value here; other conflicting flags take none
            i += if flag == "-p" { unit.len() } else { 1 };
            continue;
        }
        if !args.windows(unit.len()).any(|w| w.iter().zip(unit).all(|(a, b)| a == b)) {
            push(args, unit);
        }
        i += unit.len();
    }
}

/// Anything but another option; `-1024` is a port range.
fn is_value(tok: &str) -> bool {
    !tok.starts_with('-') || tok[1..].starts_with(|c: char| c.is_ascii_digit())
}
