use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use history_store::HistoryStore;
use monitor::{EventReceiver, Monitor, MonitorEvent, NmapScanner, ScanFailure};
use nmap_scan::BuildOptions;
use scanwatch_core::stats::assets;
use scanwatch_core::{ScanProfile, TargetDraft};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod render;

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum OutputFormat { Text, Json, Jsonl }

#[derive(Debug, Parser)]
#[command(name = "scanwatch", version, about = "Recurring nmap scans with change tracking")]
struct Cli {
    /// Optional config file (YAML). If omitted, loads ./scanwatch.yaml if present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Directory holding target configurations and scan history
    #[arg(long, global = true, value_name = "DIR")]
    data_dir: Option<PathBuf>,
    /// More logging (-v info, -vv debug, -vvv trace). RUST_LOG takes precedence.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print version information
    Version,
    /// Register a target to monitor
    Add {
        name: String,
        /// Host, CIDR range or hostname handed to nmap
        target: String,
        /// liveness, default, service, os, port, brute or vuln
        #[arg(long, value_parser = parse_profile, default_value = "default")]
        profile: ScanProfile,
        /// Minutes between scans
        #[arg(long)]
        interval: u32,
        /// Ports: comma/range list (e.g., 22,80,443 or 1-1024,8080)
        #[arg(long)]
        ports: Option<String>,
        /// Extra nmap arguments (quoted)
        #[arg(long, allow_hyphen_values = true)]
        params: Option<String>,
        /// Per-host timeout in seconds
        #[arg(long)]
        timeout_secs: Option<u64>,
        /// Minimum parallel probes
        #[arg(long)]
        threads: Option<u32>,
        #[arg(long, default_value_t = false)]
        fast: bool,
        /// Store the target without enabling it
        #[arg(long, default_value_t = false)]
        disabled: bool,
    },
    /// Delete a target and its history
    Remove { name: String },
    Enable { name: String },
    Disable { name: String },
    /// List targets
    List {
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Show recorded scans, oldest first
    History {
        name: String,
        #[arg(long, default_value_t = 10)]
        limit: usize,
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Changes between the two newest scans
    Diff {
        name: String,
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Hosts, open ports and services seen by the newest scan
    Assets {
        name: String,
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
        /// Also write the rows to a CSV file
        #[arg(long, value_name = "FILE")]
        csv: Option<PathBuf>,
    },
    /// Scan a stored target once and print what changed
    Scan {
        name: String,
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
        /// Keep the XML report in the data directory
        #[arg(long, default_value_t = false)]
        keep_artifacts: bool,
    },
    /// Scan targets on their intervals until interrupted (all enabled targets by default)
    Watch {
        names: Vec<String>,
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
        #[arg(long, default_value_t = false)]
        keep_artifacts: bool,
    },
}

fn parse_profile(s: &str) -> Result<ScanProfile, String> { s.parse() }

fn init_tracing(verbose: u8, watching: bool) {
    let filter = match verbose {
        0 if watching => "info",
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();
}

fn open_store(cfg: &config::Config) -> Result<Arc<HistoryStore>> {
    let dir = cfg.data_dir();
    let (store, problems) =
        HistoryStore::open(&dir).with_context(|| format!("opening data directory {}", dir.display()))?;
    for p in &problems {
        warn!(error = %p, "skipped unreadable data");
    }
    Ok(Arc::new(store))
}

fn build_monitor(cfg: &config::Config, store: Arc<HistoryStore>, keep_artifacts: bool) -> (Monitor, EventReceiver) {
    let options = BuildOptions { program: cfg.nmap_path(), dict_dir: cfg.dict_dir.clone() };
    let scanner = NmapScanner::new(store.layout().clone(), options)
        .keep_artifacts(keep_artifacts || cfg.keep_artifacts.unwrap_or(false));
    Monitor::new(store, Arc::new(scanner))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, matches!(cli.command, Commands::Watch { .. }));
    let mut cfg = config::load_config(cli.config.as_deref()).unwrap_or_default();
    if let Some(dir) = cli.data_dir.clone() {
        cfg.data_dir = Some(dir);
    }
    tokio::runtime::Runtime::new()?.block_on(run(cli.command, cfg))
}

async fn run(command: Commands, cfg: config::Config) -> Result<()> {
    if let Commands::Version = command {
        println!("scanwatch {} (core {})", env!("CARGO_PKG_VERSION"), scanwatch_core::version());
        return Ok(());
    }
    let store = open_store(&cfg)?;
    let keep = matches!(command, Commands::Scan { keep_artifacts: true, .. } | Commands::Watch { keep_artifacts: true, .. });
    let (monitor, mut events) = build_monitor(&cfg, store, keep);

    match command {
        Commands::Version => {}
        Commands::Add { name, target, profile, interval, ports, params, timeout_secs, threads, fast, disabled } => {
            let draft = TargetDraft {
                target: Some(target),
                scan_type: Some(profile),
                interval_minutes: Some(interval),
                ports: ports.or_else(|| cfg.default_ports.clone()),
                params: params.or_else(|| cfg.default_params.clone()),
                timeout_secs: timeout_secs.or(cfg.default_timeout_secs),
                threads: threads.or(cfg.default_threads),
                fast_mode: fast,
            };
            if let Some(p) = draft.ports.as_deref().filter(|p| !p.trim().is_empty()) {
                nmap_scan::validate_ports(p)?;
            }
            let config = monitor.add_target(&name, draft)?;
            if disabled {
                monitor.set_enabled(&name, false)?;
            }
            println!("added {name}: {} ({}, every {}m)", config.target, config.scan_type, config.interval_minutes);
        }
        Commands::Remove { name } => {
            monitor.remove_target(&name)?;
            println!("removed {name}");
        }
        Commands::Enable { name } => {
            monitor.set_enabled(&name, true)?;
            println!("enabled {name}");
        }
        Commands::Disable { name } => {
            monitor.set_enabled(&name, false)?;
            println!("disabled {name}");
        }
        Commands::List { format } => render::targets(&monitor.list_targets(), &monitor.running(), format)?,
        Commands::History { name, limit, format } => {
            ensure_target(&monitor, &name)?;
            render::history(&name, &monitor.history(&name, limit), format)?;
        }
        Commands::Diff { name, format } => render::diff(&name, &monitor.latest_diff(&name)?, format)?,
        Commands::Assets { name, format, csv } => {
            ensure_target(&monitor, &name)?;
            let latest = monitor.history(&name, 1).pop().ok_or_else(|| anyhow!("{name}: no scans recorded"))?;
            render::current_assets(&latest, format)?;
            if let Some(path) = csv {
                render::write_assets_csv(&assets(&latest), &path)
                    .with_context(|| format!("writing {}", path.display()))?;
            }
        }
        Commands::Scan { name, format, .. } => {
            ensure_target(&monitor, &name)?;
            let outcome = monitor.scan_now(&name).await;
            report_persistence(&mut events);
            let differences = outcome?;
            render::diff(&name, &differences, format)?;
        }
        Commands::Watch { names, format, .. } => watch(&monitor, &mut events, names, format).await?,
    }
    report_persistence(&mut events);
    Ok(())
}

fn ensure_target(monitor: &Monitor, name: &str) -> Result<()> {
    if monitor.list_targets().contains_key(name) {
        Ok(())
    } else {
        Err(scanwatch_core::TargetError::NotFound(name.to_string()).into())
    }
}

/// Surface write failures queued while a command ran.
fn report_persistence(events: &mut EventReceiver) {
    while let Ok(ev) = events.try_recv() {
        if let MonitorEvent::Error { target_name, kind: ScanFailure::Persistence, message, .. } = ev {
            eprintln!("warning: {target_name}: {message}");
        }
    }
}

async fn watch(monitor: &Monitor, events: &mut EventReceiver, names: Vec<String>, format: OutputFormat) -> Result<()> {
    let started = if names.is_empty() {
        monitor.start_all_enabled()
    } else {
        for name in &names {
            monitor.start(name)?;
        }
        names
    };
    if started.is_empty() {
        bail!("no enabled targets to watch");
    }
    info!(targets = started.len(), "watching; press Ctrl-C to stop");
    loop {
        tokio::select! {
            ev = events.recv() => match ev {
                Some(ev) => render::event(&ev, format)?,
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
        }
    }
    monitor.stop_all();
    Ok(())
}
