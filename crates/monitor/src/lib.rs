//! Recurring network scans of named targets, with per-scan change reports.

mod event;
mod monitor;
mod scanner;

pub use event::{EventReceiver, MonitorEvent};
pub use monitor::Monitor;
pub use scanner::{NmapScanner, ScanError, ScanFailure, Scanner, KEPT_FAILED_REPORTS};
