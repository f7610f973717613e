// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Atomic persistence for the workflow state document.
//!
//! Every write goes through the same protocol: serialize the full state,
//! write to a sibling `.tmp` file, flush and fsync, then rename over the
//! target. A crash at any byte position leaves either the pre-image or the
//! post-image on disk, never a truncation.

use harness_core::{WorkflowError, WorkflowState};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors from loading or saving the state file.
#[derive(Debug, Error)]
pub enum StateFileError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid workflow state in {path}: {source}")]
    Invalid {
        path: PathBuf,
        #[source]
        source: WorkflowError,
    },
}

/// The single on-disk home of a project's [`WorkflowState`].
///
/// No other code path writes the state file.
#[derive(Debug, Clone)]
pub struct StateFile {
    path: PathBuf,
}

impl StateFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the workflow state.
    ///
    /// An absent file yields an empty workflow. A present file is parsed,
    /// its task invariants checked, and its dependency graph cycle-checked
    /// before anything else sees it.
    pub fn load(&self) -> Result<WorkflowState, StateFileError> {
        if !self.path.exists() {
            return Ok(WorkflowState::default());
        }

        let file = File::open(&self.path)?;
        let reader = BufReader::new(file);
        let state: WorkflowState = serde_json::from_reader(reader)?;

        state.validate().map_err(|source| StateFileError::Invalid {
            path: self.path.clone(),
            source,
        })?;

        Ok(state)
    }

    /// Save the workflow state atomically (write to `.tmp`, fsync, rename).
    pub fn save(&self, state: &WorkflowState) -> Result<(), StateFileError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let tmp_path = self.path.with_extension("tmp");

        // Write to temp file and sync
        {
            let file = File::create(&tmp_path)?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer(&mut writer, state)?;
            let file = writer.into_inner().map_err(|e| e.into_error())?;
            file.sync_all()?;
        }

        // Atomic rename
        fs::rename(&tmp_path, &self.path)?;

        Ok(())
    }
}

#[cfg(test)]
#[path = "state_file_tests.rs"]
mod tests;
