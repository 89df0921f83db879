//! nmap integration: argument construction, process execution and XML report parsing.

pub mod command;
pub mod process;
pub mod report;

pub use command::{build_command, validate_ports, BuildError, BuildOptions, ScanCommand};
pub use process::{run_process, ProcessError, ProcessOutput};
pub use report::{parse_hosts, parse_report, parse_str, ParseError};
