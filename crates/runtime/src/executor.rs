// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Subprocess execution with worktree-exclusive semantics.
//!
//! `exclusive=true` serializes the command behind the process-wide
//! execution mutex (the lowest mutex in the lock order; nothing may take
//! the state or trajectory mutex while holding it). Timeouts kill the whole
//! process group, which is why children are spawned with their own pgid.
//! Output is sanitized to printable bytes plus `\n`/`\t` before it becomes
//! part of a JSON response.

use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::io::Read;
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

/// Serializes all worktree-mutating subprocess invocations.
///
/// A single process-wide mutex; exclusive-work durations dominate, so a
/// reader/writer variant adds nothing.
static EXECUTION_MUTEX: Mutex<()> = Mutex::new(());

/// The process-wide execution mutex, for back-ends outside this module.
pub(crate) fn execution_mutex() -> &'static Mutex<()> {
    &EXECUTION_MUTEX
}

/// Default subprocess timeout when the request does not carry one.
pub const DEFAULT_EXEC_TIMEOUT: Duration = Duration::from_secs(600);

/// Poll interval while waiting for a child to exit.
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// A command to run on behalf of a client.
#[derive(Debug, Clone)]
pub struct ExecRequest {
    pub argv: Vec<String>,
    pub cwd: Option<PathBuf>,
    /// Overlaid onto the daemon's environment
    pub env: BTreeMap<String, String>,
    /// Serialize behind the execution mutex
    pub exclusive: bool,
    pub timeout: Duration,
}

impl ExecRequest {
    pub fn new(argv: Vec<String>) -> Self {
        Self {
            argv,
            cwd: None,
            env: BTreeMap::new(),
            exclusive: false,
            timeout: DEFAULT_EXEC_TIMEOUT,
        }
    }
}

/// Outcome of a finished (or killed) subprocess.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ExecResult {
    pub stdout: String,
    pub stderr: String,
    /// Exit code, or the negated signal number when signal-killed
    pub return_code: i32,
    pub duration_ms: u64,
    /// Decoded signal name (`SIGKILL`, or `SIG{N}` when unknown)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signal: Option<String>,
    /// `Some("timeout")` when the deadline killed the process group
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Errors from subprocess execution.
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("empty argv")]
    EmptyArgv,

    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Uniform interface over the local and container back-ends.
pub trait Executor: Send + Sync {
    fn execute(&self, request: &ExecRequest) -> Result<ExecResult, ExecError>;
}

/// Direct spawn in the given cwd.
#[derive(Debug, Clone, Default)]
pub struct LocalExecutor;

impl Executor for LocalExecutor {
    fn execute(&self, request: &ExecRequest) -> Result<ExecResult, ExecError> {
        let _guard = request.exclusive.then(|| EXECUTION_MUTEX.lock());
        run_command(request)
    }
}

/// Spawn, wait with a deadline, and collect sanitized output.
///
/// Shared by both back-ends; the caller has already taken the execution
/// mutex when the request is exclusive.
pub(crate) fn run_command(request: &ExecRequest) -> Result<ExecResult, ExecError> {
    let (program, args) = request.argv.split_first().ok_or(ExecError::EmptyArgv)?;

    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        // Own process group so a timeout can kill the whole tree
        .process_group(0);
    if let Some(cwd) = &request.cwd {
        command.current_dir(cwd);
    }
    for (key, value) in &request.env {
        command.env(key, value);
    }

    let start = Instant::now();
    let mut child = command.spawn().map_err(|source| ExecError::Spawn {
        program: program.clone(),
        source,
    })?;

    let stdout_reader = child.stdout.take().map(spawn_reader);
    let stderr_reader = child.stderr.take().map(spawn_reader);

    let mut timed_out = false;
    let status = loop {
        if let Some(status) = child.try_wait()? {
            break status;
        }
        if start.elapsed() >= request.timeout {
            timed_out = true;
            let pgid = Pid::from_raw(child.id() as i32);
            if let Err(e) = killpg(pgid, Signal::SIGKILL) {
                warn!(pid = child.id(), error = %e, "failed to kill process group");
            }
            break child.wait()?;
        }
        std::thread::sleep(WAIT_POLL_INTERVAL);
    };

    let duration_ms = start.elapsed().as_millis() as u64;
    let stdout = join_reader(stdout_reader);
    let stderr = join_reader(stderr_reader);

    let (return_code, signal) = decode_status(status);
    debug!(
        program = %program,
        return_code,
        duration_ms,
        timed_out,
        "subprocess finished"
    );

    Ok(ExecResult {
        stdout,
        stderr,
        return_code,
        duration_ms,
        signal,
        reason: timed_out.then(|| "timeout".to_string()),
    })
}

fn spawn_reader<R: Read + Send + 'static>(mut source: R) -> std::thread::JoinHandle<Vec<u8>> {
    std::thread::spawn(move || {
        let mut buffer = Vec::new();
        let _ = source.read_to_end(&mut buffer);
        buffer
    })
}

fn join_reader(handle: Option<std::thread::JoinHandle<Vec<u8>>>) -> String {
    let bytes = handle
        .and_then(|h| h.join().ok())
        .unwrap_or_default();
    sanitize_output(&bytes)
}

/// Map an exit status to (return code, decoded signal name).
///
/// Signal deaths are reported as a negative return code, with the signal
/// number N decoded to `SIG<NAME>` where possible, `SIG{N}` otherwise.
fn decode_status(status: std::process::ExitStatus) -> (i32, Option<String>) {
    if let Some(code) = status.code() {
        return (code, None);
    }
    match status.signal() {
        Some(n) => (-n, Some(signal_name(n))),
        None => (-1, None),
    }
}

pub(crate) fn signal_name(n: i32) -> String {
    match Signal::try_from(n) {
        Ok(signal) => signal.as_str().to_string(),
        Err(_) => format!("SIG{n}"),
    }
}

/// Strip non-printable bytes other than `\n` and `\t`.
///
/// The output becomes part of a JSON RPC response, so control bytes and
/// invalid UTF-8 must not leak through.
pub(crate) fn sanitize_output(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .chars()
        .filter(|c| *c == '\n' || *c == '\t' || !c.is_control())
        .collect()
}

#[cfg(test)]
#[path = "executor_tests.rs"]
mod tests;
