//! Core model, differential comparator and scheduling for the scan monitor.

pub mod diff;
pub mod model;
pub mod scheduler;
pub mod stats;
pub mod target;

pub use diff::{diff, diff_latest, DifferenceSet, ServiceChange};
pub use model::{HostRecord, HostStatus, PortRecord, PortState, ScanSnapshot};
pub use scheduler::Scheduler;
pub use target::{ScanProfile, TargetConfig, TargetDraft, TargetError};

use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

pub const fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Current UTC time as an RFC 3339 timestamp.
pub fn now_rfc3339() -> String {
    OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_else(|_| String::new())
}
