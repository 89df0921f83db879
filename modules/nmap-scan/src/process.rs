//! Run the scanner executable and capture what it prints.

use crate::command::ScanCommand;
use std::process::Stdio;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to spawn {program}: {source}")]
    Spawn { program: String, source: std::io::Error },
    #[error("failed waiting for {program}: {source}")]
    Wait { program: String, source: std::io::Error },
}

impl ProcessError {
    /// The executable could not be found at all.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ProcessError::Spawn { source, .. } if source.kind() == std::io::ErrorKind::NotFound)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProcessOutput {
    /// Exit code; `None` when the process was killed by a signal.
    pub code: Option<i32>,
    /// stdout lines followed by stderr lines.
    pub output: Vec<String>,
}

impl ProcessOutput {
    pub fn success(&self) -> bool { self.code == Some(0) }

    /// Last few lines, for error messages.
    pub fn tail(&self, n: usize) -> String {
        let skip = self.output.len().saturating_sub(n);
        self.output[skip..].join("\n")
    }
}

/// Spawn `command`, drain both pipes line by line and wait for it to exit.
/// The child is killed if the returned future is dropped.
pub async fn run_process(command: &ScanCommand) -> Result<ProcessOutput, ProcessError> {
    let mut child = Command::new(&command.program)
        .args(&command.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| ProcessError::Spawn { program: command.program.clone(), source })?;
    debug!(command = %command, pid = ?child.id(), "scanner started");

    let stdout = child.stdout.take().map(|out| pump(out, "stdout"));
    let stderr = child.stderr.take().map(|err| pump(err, "stderr"));

    let status = child.wait().await.map_err(|source| ProcessError::Wait { program: command.program.clone(), source })?;
    let mut output = Vec::new();
    for handle in [stdout, stderr].into_iter().flatten() {
        output.extend(handle.await.unwrap_or_default());
    }
    debug!(program = %command.program, code = ?status.code(), lines = output.len(), "scanner exited");
    Ok(ProcessOutput { code: status.code(), output })
}

fn pump<R>(stream: R, label: &'static str) -> JoinHandle<Vec<String>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();
        let mut seen = Vec::new();
        while let Ok(Some(line)) = lines.next_line().await {
            debug!(stream = label, "{line}");
            seen.push(line);
        }
        seen
    })
}
