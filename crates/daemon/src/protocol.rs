// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire protocol for daemon communication.
//!
//! One request per connection: a single newline-terminated JSON object
//! tagged by `command`, answered with a single newline-terminated JSON
//! object `{"status":"ok","data":...}` or
//! `{"status":"error","code":...,"message":...}`.

use harness_core::Plan;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::{BufRead, Read, Write};
use std::path::PathBuf;
use thiserror::Error;

/// Maximum request/response line size (10 MiB).
pub const MAX_LINE_BYTES: u64 = 10 * 1024 * 1024;

/// Request from a client to the daemon.
///
/// The tagged enum doubles as the per-command schema: an unknown command or
/// a missing/mistyped field fails deserialization and becomes an
/// `invalid_request` reply.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Request {
    /// Health check
    Ping,

    /// Full workflow snapshot
    GetState,

    /// Merge scalar metadata fields
    UpdateState {
        fields: BTreeMap<String, serde_json::Value>,
    },

    /// Claim the next runnable task (or renew the current lease)
    TaskClaim { worker_id: String },

    /// Terminal transition to completed
    TaskComplete {
        id: String,
        worker_id: String,
        #[serde(default)]
        reason: Option<String>,
    },

    /// Terminal transition to failed
    TaskFail {
        id: String,
        worker_id: String,
        reason: String,
    },

    /// Run an arbitrary command through the execution runtime
    Exec {
        argv: Vec<String>,
        #[serde(default)]
        cwd: Option<PathBuf>,
        #[serde(default)]
        env: BTreeMap<String, String>,
        #[serde(default)]
        exclusive: bool,
        /// Seconds; defaults to the runtime's exec timeout
        #[serde(default)]
        timeout: Option<u64>,
    },

    /// Run `git <argv>` through the gateway (always exclusive)
    Git {
        argv: Vec<String>,
        #[serde(default)]
        cwd: Option<PathBuf>,
        #[serde(default)]
        allow_destructive: bool,
    },

    /// Replace the DAG atomically
    PlanImport { plan: Plan },

    /// Clear workflow state
    PlanReset,

    /// Snapshot summary for host-tool integration
    SessionStart,

    /// Exit policy: ok when every task is terminal
    CheckState,

    /// Ok when HEAD differs from the recorded `last_commit`
    CheckCommit,

    /// The stable per-project worker id
    WorkerId,

    /// Stop the daemon after draining in-flight handlers
    Shutdown,
}

/// Error taxonomy carried on the wire as the `code` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidRequest,
    NotFound,
    InvalidTransition,
    CycleDetected,
    PersistenceError,
    ExecutionError,
    CapabilityMissing,
    Conflict,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::InvalidRequest => "invalid_request",
            ErrorKind::NotFound => "not_found",
            ErrorKind::InvalidTransition => "invalid_transition",
            ErrorKind::CycleDetected => "cycle_detected",
            ErrorKind::PersistenceError => "persistence_error",
            ErrorKind::ExecutionError => "execution_error",
            ErrorKind::CapabilityMissing => "capability_missing",
            ErrorKind::Conflict => "conflict",
        };
        write!(f, "{name}")
    }
}

/// Response from the daemon.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Reply {
    Ok { data: serde_json::Value },
    Error { code: ErrorKind, message: String },
}

impl Reply {
    pub fn ok(data: serde_json::Value) -> Self {
        Reply::Ok { data }
    }

    pub fn error(code: ErrorKind, message: impl Into<String>) -> Self {
        Reply::Error {
            code,
            message: message.into(),
        }
    }
}

/// Protocol errors.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("line exceeds {MAX_LINE_BYTES} bytes")]
    LineTooLong,

    #[error("connection closed")]
    ConnectionClosed,
}

/// Read one newline-terminated JSON line from a blocking reader.
pub fn read_line<R: Read>(reader: &mut R) -> Result<Vec<u8>, ProtocolError> {
    let mut limited = std::io::BufReader::new(reader.take(MAX_LINE_BYTES));
    let mut line = Vec::new();
    let n = limited.read_until(b'\n', &mut line)?;
    if n == 0 {
        return Err(ProtocolError::ConnectionClosed);
    }
    if line.last() != Some(&b'\n') {
        // Either the peer omitted the terminator at EOF (fine) or the line
        // hit the size cap mid-stream.
        if line.len() as u64 == MAX_LINE_BYTES {
            return Err(ProtocolError::LineTooLong);
        }
    }
    Ok(line)
}

/// Parse a request line.
pub fn decode_request(line: &[u8]) -> Result<Request, ProtocolError> {
    Ok(serde_json::from_slice(line)?)
}

/// Write one newline-terminated JSON object.
pub fn write_line<W: Write, T: Serialize>(writer: &mut W, value: &T) -> Result<(), ProtocolError> {
    let mut bytes = serde_json::to_vec(value)?;
    bytes.push(b'\n');
    writer.write_all(&bytes)?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
