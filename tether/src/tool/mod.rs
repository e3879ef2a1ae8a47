//! External tool invocation
//!
//! [`ToolRunner`] is the seam the port poller calls through; [`SubprocessRunner`]
//! spawns real processes, tests substitute their own runners.

pub mod resolve;

use std::fmt;
use std::io::{self, Read};
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use tracing::debug;
use wait_timeout::ChildExt;

pub use resolve::{find_executable, ToolNotFound};

/// Default ceiling for a single tool invocation
pub const DEFAULT_INVOCATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for collecting output from child process pipes
const OUTPUT_COLLECTION_TIMEOUT: Duration = Duration::from_secs(10);

/// Maximum captured output per stream (1MB)
const MAX_OUTPUT_SIZE: usize = 1024 * 1024;

/// Captured result of running a tool to completion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    /// Exit code, `None` if the process was killed by a signal or timed out
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
}

impl ToolInvocation {
    /// Invocation that ran to completion with exit code `status`
    pub fn exited(status: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            stdout: stdout.into(),
            stderr: stderr.into(),
            timed_out: false,
        }
    }

    pub fn success(&self) -> bool {
        self.status == Some(0) && !self.timed_out
    }
}

impl fmt::Display for ToolInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.timed_out {
            write!(f, "timed out")?;
        } else {
            match self.status {
                Some(code) => write!(f, "exit status {code}")?,
                None => write!(f, "killed by signal")?,
            }
        }
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            write!(f, ": {stderr}")?;
        }
        Ok(())
    }
}

/// Runs an external command and captures its output.
///
/// `Err` means the command could not be started at all. A command that ran
/// and exited non-zero is `Ok` with an unsuccessful [`ToolInvocation`].
pub trait ToolRunner {
    fn invoke(&self, program: &Path, args: &[String]) -> io::Result<ToolInvocation>;
}

impl<R: ToolRunner + ?Sized> ToolRunner for &R {
    fn invoke(&self, program: &Path, args: &[String]) -> io::Result<ToolInvocation> {
        (**self).invoke(program, args)
    }
}

/// [`ToolRunner`] that spawns real child processes.
#[derive(Debug, Clone)]
pub struct SubprocessRunner {
    timeout: Duration,
}

impl SubprocessRunner {
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_INVOCATION_TIMEOUT)
    }

    /// The child is killed if it runs longer than `timeout`.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for SubprocessRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRunner for SubprocessRunner {
    fn invoke(&self, program: &Path, args: &[String]) -> io::Result<ToolInvocation> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        // Drain both pipes while waiting; a full pipe buffer would otherwise
        // block the child forever.
        let stdout_rx = drain(child.stdout.take());
        let stderr_rx = drain(child.stderr.take());

        let waited = child.wait_timeout(self.timeout);
        let wait_result = settle(&mut child, waited)?;
        let timed_out = wait_result.is_none();

        let stdout = stdout_rx
            .recv_timeout(OUTPUT_COLLECTION_TIMEOUT)
            .unwrap_or_default();
        let stderr = stderr_rx
            .recv_timeout(OUTPUT_COLLECTION_TIMEOUT)
            .unwrap_or_default();

        let status = wait_result.and_then(|s| s.code());
        debug!(
            program = %program.display(),
            ?status,
            timed_out,
            "tool invocation finished"
        );

        Ok(ToolInvocation {
            status,
            stdout,
            stderr,
            timed_out,
        })
    }
}

fn drain<R: Read + Send + 'static>(stream: Option<R>) -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel();
    match stream {
        Some(stream) => {
            thread::spawn(move || {
                let _ = tx.send(read_stream_to_string(stream));
            });
        }
        None => {
            let _ = tx.send(String::new());
        }
    }
    rx
}

/// Read a stream to a string, keeping at most `MAX_OUTPUT_SIZE` bytes.
///
/// The rest of the stream is still consumed so the writer never sees a
/// broken pipe.
fn read_stream_to_string<R: Read>(mut stream: R) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 8192];

    loop {
        match stream.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                let remaining = MAX_OUTPUT_SIZE.saturating_sub(buf.len());
                buf.extend_from_slice(&chunk[..n.min(remaining)]);
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(_) => break,
        }
    }

    String::from_utf8_lossy(&buf).into_owned()
}

/// Kill and reap the child unless it exited on its own.
///
/// The drain threads only finish once the child's pipes close, so every path
/// that gives up on the child must reap it.
fn settle(
    child: &mut Child,
    waited: io::Result<Option<ExitStatus>>,
) -> io::Result<Option<ExitStatus>> {
    match waited {
        Ok(Some(status)) => Ok(Some(status)),
        Ok(None) => {
            kill_child(child);
            Ok(None)
        }
        Err(e) => {
            kill_child(child);
            Err(e)
        }
    }
}

fn kill_child(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}
