// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Runs the node as a child process, relays its output and reports its exit.

pub mod buffer;

use std::fmt;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{self, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::command::LaunchCommand;
use crate::error::{EntrypointError, EXIT_CODE_FATAL};
pub use buffer::{OutputBuffer, STDERR_BUFFER_BYTES, STDOUT_BUFFER_BYTES};

pub const STDERR_PREFIX: &str = "[stderr] ";
pub const STARTUP_GRACE: Duration = Duration::from_millis(500);
pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);
pub const IMMEDIATE_EXIT_DRAIN_TIMEOUT: Duration = Duration::from_secs(3);
/// How long a cancelled relay gets to hand back its buffer before it is aborted.
pub const CANCEL_JOIN_TIMEOUT: Duration = Duration::from_millis(500);

/// How a supervised child ended, with the tail of its output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisedExit {
    pub code: i32,
    pub pid: Option<u32>,
    pub exited_immediately: bool,
    pub stdout: OutputBuffer,
    pub stderr: OutputBuffer,
}

impl SupervisedExit {
    pub fn success(&self) -> bool {
        self.code == 0
    }

    /// A report for a non-zero exit, `None` on success.
    pub fn failure_report(&self, heap_gb: u32, cpu_count: u32) -> Option<FailureReport<'_>> {
        (!self.success()).then_some(FailureReport {
            exit: self,
            heap_gb,
            cpu_count,
        })
    }
}

/// The diagnostic printed to stderr after a failed run.
#[derive(Debug)]
pub struct FailureReport<'a> {
    exit: &'a SupervisedExit,
    heap_gb: u32,
    cpu_count: u32,
}

impl fmt::Display for FailureReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let exit = self.exit;
        writeln!(f, "\n=== Process exited with code: {} ===", exit.code)?;

        if !exit.stderr.is_empty() {
            writeln!(
                f,
                "\n=== Error output (stderr) - last {} lines ===",
                exit.stderr.len()
            )?;
            for line in exit.stderr.lines() {
                writeln!(f, "{line}")?;
            }
            writeln!(f, "=== End of error output ===")?;
            if exit.stderr.evicted() > 0 {
                writeln!(f, "({} earlier lines not shown)", exit.stderr.evicted())?;
            }
        }

        if !exit.stdout.is_empty() {
            writeln!(
                f,
                "\n=== Standard output (stdout) - last {} lines ===",
                exit.stdout.len()
            )?;
            for line in exit.stdout.lines() {
                writeln!(f, "{line}")?;
            }
            writeln!(f, "=== End of standard output ===")?;
            if exit.stdout.evicted() > 0 {
                writeln!(f, "({} earlier lines not shown)", exit.stdout.evicted())?;
            }
        }

        if exit.stdout.is_empty() && exit.stderr.is_empty() {
            let heap_gb = self.heap_gb;
            writeln!(
                f,
                "No output captured from process (neither stdout nor stderr)."
            )?;
            writeln!(f, "This usually means:")?;
            writeln!(f, "  1. JVM failed to start (check memory allocation)")?;
            writeln!(f, "  2. Config file has errors")?;
            writeln!(f, "  3. JAR file is corrupted")?;
            writeln!(f, "\nTrying to allocate {heap_gb}GB heap.")?;
            writeln!(f, "Available CPUs: {}", self.cpu_count)?;
            writeln!(f, "\nTroubleshooting:")?;
            writeln!(
                f,
                "  - Check if system has enough memory for {heap_gb}GB heap"
            )?;
            writeln!(f, "  - Try reducing JAVA_HEAP_SIZE environment variable")?;
            writeln!(
                f,
                "  - Check Docker container memory limits if running in Docker"
            )?;
        }
        Ok(())
    }
}

/// Copies `reader` to `writer` line by line, flushing each line, and keeps the most
/// recent lines within `budget` bytes.
///
/// Returns when the stream ends or `cancel` fires, handing back whatever was buffered.
pub async fn relay_stream<R, W>(
    reader: R,
    mut writer: W,
    prefix: &'static str,
    budget: usize,
    cancel: CancellationToken,
) -> OutputBuffer
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buffer = OutputBuffer::new(budget);
    let mut reader = BufReader::new(reader);
    let mut raw = Vec::new();

    loop {
        raw.clear();
        let read = tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Output relay cancelled");
                break;
            }
            read = reader.read_until(b'\n', &mut raw) => read,
        };

        match read {
            Ok(0) => break,
            Ok(_) => {
                let line = decode_line(&raw);
                raw.clear();
                let relayed = format!("{prefix}{line}\n");
                // A stalled parent stream must not outlive cancellation.
                let written = tokio::select! {
                    _ = cancel.cancelled() => None,
                    written = relay_line(&mut writer, relayed.as_bytes()) => Some(written),
                };
                buffer.push(line);
                match written {
                    Some(Ok(())) => {}
                    Some(Err(e)) => debug!("Failed to relay process output: {e}"),
                    None => {
                        debug!("Output relay cancelled while writing");
                        break;
                    }
                }
            }
            Err(e) => {
                warn!("Error reading process output: {e}");
                break;
            }
        }
    }

    // A read interrupted by cancellation may leave a partial line behind.
    if !raw.is_empty() {
        buffer.push(decode_line(&raw));
    }
    buffer
}

async fn relay_line<W: AsyncWrite + Unpin>(writer: &mut W, line: &[u8]) -> io::Result<()> {
    writer.write_all(line).await?;
    writer.flush().await
}

fn decode_line(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw)
        .trim_end_matches(['\n', '\r'])
        .to_string()
}

/// Maps an exit status to the code the entrypoint exits with.
pub fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    EXIT_CODE_FATAL
}

#[derive(Debug, Clone, Copy)]
pub struct Supervisor {
    pub startup_grace: Duration,
    pub drain_timeout: Duration,
    pub immediate_exit_drain_timeout: Duration,
    pub stdout_budget: usize,
    pub stderr_budget: usize,
}

impl Default for Supervisor {
    fn default() -> Self {
        Self {
            startup_grace: STARTUP_GRACE,
            drain_timeout: DRAIN_TIMEOUT,
            immediate_exit_drain_timeout: IMMEDIATE_EXIT_DRAIN_TIMEOUT,
            stdout_budget: STDOUT_BUFFER_BYTES,
            stderr_budget: STDERR_BUFFER_BYTES,
        }
    }
}

impl Supervisor {
    /// Spawns `command`, relays its output and waits for it to exit.
    pub async fn run(&self, command: &LaunchCommand) -> Result<SupervisedExit, EntrypointError> {
        let mut child = Command::new(&command.program)
            .args(&command.args)
            .current_dir(&command.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| EntrypointError::Spawn {
                program: command.program.display().to_string(),
                source,
            })?;

        let pid = child.id();
        match pid {
            Some(pid) => info!("Process started, PID: {pid}"),
            None => info!("Process started, PID: unknown"),
        }

        let stdout_cancel = CancellationToken::new();
        let stderr_cancel = CancellationToken::new();
        let stdout_task = child.stdout.take().map(|stdout| {
            tokio::spawn(relay_stream(
                stdout,
                io::stdout(),
                "",
                self.stdout_budget,
                stdout_cancel.clone(),
            ))
        });
        let stderr_task = child.stderr.take().map(|stderr| {
            tokio::spawn(relay_stream(
                stderr,
                io::stderr(),
                STDERR_PREFIX,
                self.stderr_budget,
                stderr_cancel.clone(),
            ))
        });

        tokio::time::sleep(self.startup_grace).await;
        let early_status = child.try_wait().map_err(EntrypointError::Wait)?;
        let exited_immediately = early_status.is_some();
        let status = match early_status {
            Some(status) => {
                warn!(
                    "Process exited immediately with code: {}",
                    exit_code(status)
                );
                warn!("This usually indicates a JVM startup failure.");
                status
            }
            None => child.wait().await.map_err(EntrypointError::Wait)?,
        };
        let code = exit_code(status);
        debug!("Process exited with code {code}, draining output");

        let drain_timeout = if exited_immediately {
            self.immediate_exit_drain_timeout
        } else {
            self.drain_timeout
        };
        let (stdout, stderr) = tokio::join!(
            collect_output(stdout_task, drain_timeout, &stdout_cancel, self.stdout_budget),
            collect_output(stderr_task, drain_timeout, &stderr_cancel, self.stderr_budget),
        );

        Ok(SupervisedExit {
            code,
            pid,
            exited_immediately,
            stdout,
            stderr,
        })
    }
}

/// Waits for a relay task to finish, cancelling it once `timeout` passes.
async fn collect_output(
    task: Option<JoinHandle<OutputBuffer>>,
    timeout: Duration,
    cancel: &CancellationToken,
    budget: usize,
) -> OutputBuffer {
    let Some(mut task) = task else {
        return OutputBuffer::new(budget);
    };

    let joined = match tokio::time::timeout(timeout, &mut task).await {
        Ok(joined) => joined,
        Err(_) => {
            debug!("Output relay did not drain within {timeout:?}, cancelling");
            cancel.cancel();
            match tokio::time::timeout(CANCEL_JOIN_TIMEOUT, &mut task).await {
                Ok(joined) => joined,
                Err(_) => {
                    warn!("Output relay ignored cancellation, aborting it");
                    task.abort();
                    return OutputBuffer::new(budget);
                }
            }
        }
    };

    joined.unwrap_or_else(|e| {
        warn!("Output relay task failed: {e}");
        OutputBuffer::new(budget)
    })
}
