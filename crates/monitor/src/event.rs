use crate::scanner::ScanFailure;
use scanwatch_core::{now_rfc3339, DifferenceSet, ScanSnapshot};
use serde::Serialize;
use tokio::sync::mpsc;

pub type EventReceiver = mpsc::UnboundedReceiver<MonitorEvent>;
pub(crate) type EventSender = mpsc::UnboundedSender<MonitorEvent>;

/// Notifications about scan executions, in the order they happen per target.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MonitorEvent {
    Progress { target_name: String, message: String, at: String },
    Completed { target_name: String, snapshot: ScanSnapshot, differences: DifferenceSet, at: String },
    Error { target_name: String, kind: ScanFailure, message: String, at: String },
}

impl MonitorEvent {
    pub(crate) fn progress(name: &str, message: impl Into<String>) -> Self {
        MonitorEvent::Progress { target_name: name.to_string(), message: message.into(), at: now_rfc3339() }
    }

    pub(crate) fn completed(name: &str, snapshot: ScanSnapshot, differences: DifferenceSet) -> Self {
        MonitorEvent::Completed { target_name: name.to_string(), snapshot, differences, at: now_rfc3339() }
    }

    pub(crate) fn error(name: &str, kind: ScanFailure, message: impl Into<String>) -> Self {
        MonitorEvent::Error { target_name: name.to_string(), kind, message: message.into(), at: now_rfc3339() }
    }

    pub fn target_name(&self) -> &str {
        match self {
            MonitorEvent::Progress { target_name, .. }
            | MonitorEvent::Completed { target_name, .. }
            | MonitorEvent::Error { target_name, .. } => target_name,
        }
    }
}
