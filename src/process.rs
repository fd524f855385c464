// src/process.rs
//! Running external programs under cooperative cancellation
//!
//! Extraction tools and content installers are waited on with short
//! `wait_timeout` slices so the session's cancel flag is honoured while the
//! child runs. Output is captured and forwarded to the log once the child
//! exits.

use crate::control::SessionControl;
use crate::error::{Error, Result};
use std::io::Read;
use std::process::{Command, ExitStatus, Stdio};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use wait_timeout::ChildExt;

/// How a supervised child ended
#[derive(Debug)]
pub struct ProcessOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// Last non-empty stderr line, for compact error messages
    pub fn last_error_line(&self) -> Option<&str> {
        self.stderr.lines().rev().find(|line| !line.trim().is_empty())
    }
}

/// Spawn `command` and wait for it, polling `control` every `poll`
///
/// A cancel request kills the child and returns `Err(Cancelled)`. When
/// `timeout` is set and elapses the child is killed as well.
pub fn run_supervised(
    mut command: Command,
    label: &str,
    control: &SessionControl,
    poll: Duration,
    timeout: Option<Duration>,
) -> Result<ProcessOutput> {
    debug!("Spawning {}: {:?}", label, command);
    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| Error::ResourceMissing(format!("Failed to spawn {label}: {e}")))?;

    // Drain pipes while waiting so chatty tools never block on a full buffer
    let stdout_reader = child.stdout.take().map(drain);
    let stderr_reader = child.stderr.take().map(drain);

    let started = Instant::now();
    let status = loop {
        if control.is_cancelled() {
            warn!("Cancelling {} (pid {})", label, child.id());
            let _ = child.kill();
            let _ = child.wait();
            return Err(Error::Cancelled);
        }
        if let Some(limit) = timeout
            && started.elapsed() >= limit
        {
            let _ = child.kill();
            let _ = child.wait();
            return Err(Error::ResourceMissing(format!(
                "{label} did not finish within {} seconds",
                limit.as_secs()
            )));
        }

        if let Some(status) = child.wait_timeout(poll)? {
            break status;
        }
    };

    let stdout = collect(stdout_reader);
    let stderr = collect(stderr_reader);
    for line in stdout.lines().filter(|l| !l.trim().is_empty()) {
        debug!("[{}] {}", label, line);
    }
    for line in stderr.lines().filter(|l| !l.trim().is_empty()) {
        warn!("[{}] {}", label, line);
    }
    info!("{} exited with {}", label, status);

    Ok(ProcessOutput {
        status,
        stdout,
        stderr,
    })
}

fn drain<R: Read + Send + 'static>(mut pipe: R) -> JoinHandle<Vec<u8>> {
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        buf
    })
}

fn collect(reader: Option<JoinHandle<Vec<u8>>>) -> String {
    reader
        .and_then(|handle| handle.join().ok())
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default()
}
