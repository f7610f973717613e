// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stable per-project worker identity.
//!
//! A single-line file holding a random token. The first read generates and
//! writes the token (write-through on miss); every later read returns the
//! same value.

use harness_core::{IdGen, WorkerId};
use std::fs;
use std::io;
use std::path::Path;
use thiserror::Error;

/// Errors from worker identity handling.
#[derive(Debug, Error)]
pub enum WorkerIdError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Read the worker id at `path`, generating and persisting one if absent.
pub fn load_or_create_worker_id(
    path: &Path,
    id_gen: &impl IdGen,
) -> Result<WorkerId, WorkerIdError> {
    match fs::read_to_string(path) {
        Ok(contents) => {
            let token = contents.trim();
            if !token.is_empty() {
                return Ok(WorkerId::new(token));
            }
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }

    let token = id_gen.next();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, format!("{token}\n"))?;
    Ok(WorkerId::new(token))
}

#[cfg(test)]
#[path = "worker_id_tests.rs"]
mod tests;
