use async_trait::async_trait;
use history_store::HistoryStore;
use monitor::{EventReceiver, Monitor, MonitorEvent, ScanError, ScanFailure, Scanner};
use scanwatch_core::{
    now_rfc3339, HostRecord, HostStatus, PortRecord, PortState, ScanProfile, ScanSnapshot, TargetConfig, TargetDraft,
    TargetError,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

/// Hands out pre-baked results in order, then empty scans.
#[derive(Default)]
struct ScriptedScanner {
    script: Mutex<VecDeque<Result<Vec<HostRecord>, ScanError>>>,
    calls: AtomicUsize,
}

impl ScriptedScanner {
    fn with(results: Vec<Result<Vec<HostRecord>, ScanError>>) -> Arc<Self> {
        Arc::new(ScriptedScanner { script: Mutex::new(results.into()), calls: AtomicUsize::new(0) })
    }

    fn calls(&self) -> usize { self.calls.load(Ordering::SeqCst) }
}

#[async_trait]
impl Scanner for ScriptedScanner {
    async fn scan(&self, name: &str, _config: &TargetConfig) -> Result<ScanSnapshot, ScanError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().unwrap().pop_front().unwrap_or_else(|| Ok(Vec::new()));
        next.map(|hosts| ScanSnapshot { timestamp: now_rfc3339(), target_name: name.to_string(), hosts })
    }
}

/// Blocks each scan until released.
#[derive(Default)]
struct GatedScanner {
    started: Notify,
    release: Notify,
}

#[async_trait]
impl Scanner for GatedScanner {
    async fn scan(&self, name: &str, _config: &TargetConfig) -> Result<ScanSnapshot, ScanError> {
        self.started.notify_one();
        self.release.notified().await;
        Ok(ScanSnapshot { timestamp: now_rfc3339(), target_name: name.to_string(), hosts: vec![host("10.0.0.9", &[22])] })
    }
}

fn host(ip: &str, open: &[u16]) -> HostRecord {
    open.iter()
        .fold(HostRecord::new(ip, HostStatus::Up), |h, p| h.with_port(PortRecord::new(*p, "tcp", PortState::Open)))
}

fn setup(scanner: Arc<ScriptedScanner>) -> (tempfile::TempDir, Monitor, EventReceiver) {
    let dir = tempfile::tempdir().unwrap();
    let (store, problems) = HistoryStore::open(dir.path()).unwrap();
    assert!(problems.is_empty());
    let (monitor, rx) = Monitor::new(Arc::new(store), scanner);
    (dir, monitor, rx)
}

fn draft() -> TargetDraft { TargetDraft::new("10.0.0.0/24", ScanProfile::Service, 1) }

/// Skip progress notices and return the next completion or error.
async fn outcome(rx: &mut EventReceiver) -> MonitorEvent {
    loop {
        let event = rx.recv().await.unwrap();
        if !matches!(event, MonitorEvent::Progress { .. }) {
            return event;
        }
    }
}

#[tokio::test]
async fn scan_now_records_history_and_reports_changes() {
    let scanner = ScriptedScanner::with(vec![Ok(vec![host("10.0.0.1", &[22])]), Ok(vec![host("10.0.0.1", &[22, 443])])]);
    let (_dir, monitor, mut rx) = setup(scanner.clone());
    monitor.add_target("lab", draft()).unwrap();

    let first = monitor.scan_now("lab").await.unwrap();
    assert_eq!(first.new_hosts, vec!["10.0.0.1"]);
    assert_eq!(first.new_ports, vec!["10.0.0.1:22/tcp"]);
    match outcome(&mut rx).await {
        MonitorEvent::Completed { target_name, snapshot, differences, .. } => {
            assert_eq!(target_name, "lab");
            assert_eq!(snapshot.hosts.len(), 1);
            assert_eq!(differences, first);
        }
        other => panic!("unexpected event {other:?}"),
    }

    let second = monitor.scan_now("lab").await.unwrap();
    assert!(second.new_hosts.is_empty());
    assert_eq!(second.new_ports, vec!["10.0.0.1:443/tcp"]);
    assert_eq!(monitor.latest_diff("lab").unwrap(), second);
    assert_eq!(monitor.history("lab", 10).len(), 2);
    assert!(monitor.list_targets()["lab"].last_scan_time.is_some());
    assert_eq!(scanner.calls(), 2);
}

#[tokio::test]
async fn failed_scan_leaves_state_untouched() {
    let scanner = ScriptedScanner::with(vec![Err(ScanError::new(ScanFailure::Exit, "lab: exit status 1"))]);
    let (_dir, monitor, mut rx) = setup(scanner);
    monitor.add_target("lab", draft()).unwrap();

    let err = monitor.scan_now("lab").await.unwrap_err();
    assert_eq!(err.kind, ScanFailure::Exit);
    match outcome(&mut rx).await {
        MonitorEvent::Error { target_name, kind, .. } => {
            assert_eq!(target_name, "lab");
            assert_eq!(kind, ScanFailure::Exit);
        }
        other => panic!("unexpected event {other:?}"),
    }
    assert!(monitor.history("lab", 10).is_empty());
    assert!(monitor.list_targets()["lab"].last_scan_time.is_none());

    let unknown = monitor.scan_now("ghost").await.unwrap_err();
    assert_eq!(unknown.kind, ScanFailure::Target);
}

#[tokio::test]
async fn start_checks_existence_and_enabled_flag() {
    let (_dir, monitor, _rx) = setup(ScriptedScanner::with(vec![]));
    assert_eq!(monitor.start("ghost"), Err(TargetError::NotFound("ghost".into())));

    monitor.add_target("lab", draft()).unwrap();
    monitor.set_enabled("lab", false).unwrap();
    assert_eq!(monitor.start("lab"), Err(TargetError::Disabled("lab".into())));
    assert!(!monitor.is_running("lab"));

    monitor.set_enabled("lab", true).unwrap();
    monitor.start("lab").unwrap();
    assert_eq!(monitor.running(), vec!["lab"]);
    monitor.set_enabled("lab", false).unwrap();
    assert!(monitor.running().is_empty());
    assert!(!monitor.stop("lab"));
}

#[tokio::test(start_paused = true)]
async fn timer_scans_immediately_and_then_every_interval() {
    let scanner = ScriptedScanner::with(vec![Ok(vec![host("10.0.0.1", &[80])]), Ok(vec![])]);
    let (_dir, monitor, mut rx) = setup(scanner.clone());
    monitor.add_target("lab", draft()).unwrap();
    monitor.start("lab").unwrap();

    match outcome(&mut rx).await {
        MonitorEvent::Completed { differences, .. } => assert_eq!(differences.new_hosts, vec!["10.0.0.1"]),
        other => panic!("unexpected event {other:?}"),
    }
    match outcome(&mut rx).await {
        MonitorEvent::Completed { differences, .. } => {
            assert_eq!(differences.disappeared_hosts, vec!["10.0.0.1"]);
            assert_eq!(differences.disappeared_ports, vec!["10.0.0.1:80/tcp"]);
        }
        other => panic!("unexpected event {other:?}"),
    }
    assert!(scanner.calls() >= 2);
    assert!(monitor.stop("lab"));
    assert!(monitor.running().is_empty());
}

#[tokio::test]
async fn remove_stops_the_timer_and_drops_history() {
    let (dir, monitor, _rx) = setup(ScriptedScanner::with(vec![Ok(vec![host("10.0.0.1", &[22])])]));
    monitor.add_target("lab", draft()).unwrap();
    monitor.scan_now("lab").await.unwrap();
    monitor.start("lab").unwrap();
    assert!(dir.path().join("lab_history.json").exists());

    monitor.remove_target("lab").unwrap();
    assert!(!monitor.is_running("lab"));
    assert!(monitor.list_targets().is_empty());
    assert!(monitor.history("lab", 10).is_empty());
    assert!(!dir.path().join("lab_history.json").exists());
    assert_eq!(monitor.remove_target("lab"), Err(TargetError::NotFound("lab".into())));
}

#[tokio::test]
async fn start_all_enabled_skips_disabled_targets() {
    let (_dir, monitor, _rx) = setup(ScriptedScanner::with(vec![]));
    monitor.add_target("a", draft()).unwrap();
    monitor.add_target("b", draft()).unwrap();
    monitor.set_enabled("b", false).unwrap();
    assert_eq!(monitor.start_all_enabled(), vec!["a"]);
    assert_eq!(monitor.running(), vec!["a"]);
    monitor.stop_all();
    assert!(monitor.running().is_empty());
}

#[tokio::test]
async fn write_failure_is_reported_but_scan_still_counts() {
    let (dir, monitor, mut rx) = setup(ScriptedScanner::with(vec![Ok(vec![host("10.0.0.1", &[22])])]));
    monitor.add_target("lab", draft()).unwrap();
    std::fs::create_dir(dir.path().join("lab_history.json")).unwrap();
    std::fs::write(dir.path().join("lab_history.json").join("block"), b"x").unwrap();

    let differences = monitor.scan_now("lab").await.unwrap();
    assert_eq!(differences.new_hosts, vec!["10.0.0.1"]);
    match outcome(&mut rx).await {
        MonitorEvent::Error { kind, .. } => assert_eq!(kind, ScanFailure::Persistence),
        other => panic!("unexpected event {other:?}"),
    }
    assert!(matches!(outcome(&mut rx).await, MonitorEvent::Completed { .. }));
    assert_eq!(monitor.history("lab", 10).len(), 1);
}

#[tokio::test]
async fn scan_spanning_remove_and_readd_is_discarded() {
    let dir = tempfile::tempdir().unwrap();
    let (store, _) = HistoryStore::open(dir.path()).unwrap();
    let gate = Arc::new(GatedScanner::default());
    let (monitor, _rx) = Monitor::new(Arc::new(store), gate.clone());
    let monitor = Arc::new(monitor);
    monitor.add_target("lab", draft()).unwrap();

    let pending = tokio::spawn({
        let monitor = Arc::clone(&monitor);
        async move { monitor.scan_now("lab").await }
    });
    gate.started.notified().await;
    monitor.remove_target("lab").unwrap();
    monitor.add_target("lab", TargetDraft::new("10.0.1.0/24", ScanProfile::Os, 5)).unwrap();
    gate.release.notify_one();

    let err = pending.await.unwrap().unwrap_err();
    assert_eq!(err.kind, ScanFailure::Target);
    assert!(monitor.history("lab", 10).is_empty());
    assert!(monitor.list_targets()["lab"].last_scan_time.is_none());
    assert!(!dir.path().join("lab_history.json").exists());
}
