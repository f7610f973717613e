// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only trajectory log.
//!
//! One JSON object per line. `append` opens the file in append mode, writes
//! a single line, flushes, and closes, serialized by an internal mutex so
//! concurrent callers never interleave partial writes. `tail` reads 4 KiB
//! blocks backwards from end-of-file, so the hot path never reads the whole
//! log. A corrupt trailing line (crash mid-append) is silently dropped.

use chrono::Utc;
use harness_core::TrajectoryEvent;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;
use tracing::debug;

/// Block size for the reverse tail reader.
const TAIL_BLOCK_SIZE: u64 = 4096;

/// Errors from trajectory operations.
#[derive(Debug, Error)]
pub enum TrajectoryError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Durable, append-only event history with efficient tail reads.
pub struct TrajectoryLog {
    path: PathBuf,
    /// Serializes appends; tail reads are lock-free
    write_lock: Mutex<()>,
    /// Monotonic anchor for the `timestamp` field
    opened: Instant,
}

impl TrajectoryLog {
    /// Open (or create the parent directory for) a trajectory log.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, TrajectoryError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(Self {
            path,
            write_lock: Mutex::new(()),
            opened: Instant::now(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one event as a single JSON line.
    ///
    /// Stamps `timestamp` (monotonic seconds since open) and `wall_time`
    /// before serializing. The write is flushed to the OS before the file
    /// is closed.
    pub fn append(&self, mut event: TrajectoryEvent) -> Result<(), TrajectoryError> {
        event.timestamp = self.opened.elapsed().as_secs_f64();
        event.wall_time = Utc::now();
        let mut line = serde_json::to_vec(&event)?;
        line.push(b'\n');

        let _guard = self.write_lock.lock();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(&line)?;
        file.flush()?;
        Ok(())
    }

    /// The last `n` well-formed records, newest last.
    ///
    /// Seeks to end-of-file and reads blocks backwards until at least `n`+1
    /// line separators are found or start-of-file is reached. Partial or
    /// corrupt trailing lines are discarded; earlier lines remain readable.
    pub fn tail(&self, n: usize) -> Result<Vec<TrajectoryEvent>, TrajectoryError> {
        let mut file = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let len = file.seek(SeekFrom::End(0))?;
        let mut buffer: Vec<u8> = Vec::new();
        let mut pos = len;
        let mut separators = 0usize;

        while pos > 0 && separators < n + 1 {
            let read_len = TAIL_BLOCK_SIZE.min(pos);
            pos -= read_len;
            file.seek(SeekFrom::Start(pos))?;

            let mut block = vec![0u8; read_len as usize];
            file.read_exact(&mut block)?;
            separators += block.iter().filter(|b| **b == b'\n').count();

            block.extend_from_slice(&buffer);
            buffer = block;
        }

        // If the scan stopped mid-file, the head of the buffer is a partial
        // line; everything before the first separator belongs to it.
        let start = if pos > 0 {
            buffer
                .iter()
                .position(|b| *b == b'\n')
                .map(|i| i + 1)
                .unwrap_or(buffer.len())
        } else {
            0
        };

        let mut records: Vec<TrajectoryEvent> = Vec::new();
        for line in buffer[start..].split(|b| *b == b'\n') {
            if line.is_empty() {
                continue;
            }
            match serde_json::from_slice(line) {
                Ok(event) => records.push(event),
                Err(e) => {
                    // Crash mid-append leaves a torn trailing line; drop it.
                    debug!(error = %e, "dropping unparseable trajectory line");
                }
            }
        }

        if records.len() > n {
            let skip = records.len() - n;
            records.drain(..skip);
        }
        Ok(records)
    }
}

#[cfg(test)]
#[path = "trajectory_tests.rs"]
mod tests;
