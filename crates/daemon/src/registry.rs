// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Content-addressed project registry.
//!
//! Maps an absolute project path to its socket, pid, state, and trajectory
//! paths. The socket name is the first 12 hex characters of a sha256 of
//! the project path, so identical paths always resolve to the same socket.
//! The registry file is replaced atomically (tmp + rename) on first
//! contact from a new project.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Number of hash characters in the socket name.
const SOCKET_HASH_LEN: usize = 12;

/// Errors from registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("could not determine a runtime directory")]
    NoRuntimeDir,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Everything the daemon and client need to find a project's files.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProjectPaths {
    pub project_root: PathBuf,
    pub socket_path: PathBuf,
    pub pid_path: PathBuf,
    pub state_path: PathBuf,
    pub trajectory_path: PathBuf,
    pub worker_id_path: PathBuf,
    pub log_path: PathBuf,
}

/// The persisted registry document: project path → its paths.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct RegistryDoc {
    #[serde(default)]
    projects: BTreeMap<PathBuf, ProjectPaths>,
}

/// First 12 hex characters of a stable hash of the absolute project path.
pub fn socket_hash(project_root: &Path) -> String {
    let digest = Sha256::digest(project_root.as_os_str().as_encoded_bytes());
    let mut hex = String::with_capacity(SOCKET_HASH_LEN);
    for byte in digest.iter().take(SOCKET_HASH_LEN / 2) {
        hex.push_str(&format!("{byte:02x}"));
    }
    hex
}

/// Deterministic discovery of daemon sockets and project state files.
#[derive(Debug, Clone)]
pub struct Registry {
    runtime_dir: PathBuf,
}

impl Registry {
    /// Registry under the user runtime directory.
    ///
    /// `HARNESS_RUNTIME_DIR` overrides the location wholesale (tests,
    /// sandboxes); otherwise the platform runtime dir is used with state
    /// and cache dirs as fallbacks.
    pub fn new() -> Result<Self, RegistryError> {
        if let Some(dir) = std::env::var_os("HARNESS_RUNTIME_DIR") {
            return Ok(Self {
                runtime_dir: PathBuf::from(dir),
            });
        }
        let runtime_dir = dirs::runtime_dir()
            .or_else(dirs::state_dir)
            .or_else(dirs::cache_dir)
            .ok_or(RegistryError::NoRuntimeDir)?
            .join("harness");
        Ok(Self { runtime_dir })
    }

    /// Registry rooted at an explicit directory (tests, overrides).
    pub fn with_runtime_dir(runtime_dir: impl Into<PathBuf>) -> Self {
        Self {
            runtime_dir: runtime_dir.into(),
        }
    }

    pub fn runtime_dir(&self) -> &Path {
        &self.runtime_dir
    }

    fn registry_path(&self) -> PathBuf {
        self.runtime_dir.join("registry.json")
    }

    /// Derive the full path set for a project. Pure; nothing is created.
    pub fn paths_for(&self, project_root: &Path) -> ProjectPaths {
        let hash = socket_hash(project_root);
        let sockets = self.runtime_dir.join("sockets");
        let harness_dir = project_root.join(".harness");
        ProjectPaths {
            project_root: project_root.to_path_buf(),
            socket_path: sockets.join(format!("{hash}.sock")),
            pid_path: sockets.join(format!("{hash}.pid")),
            state_path: harness_dir.join("state.json"),
            trajectory_path: harness_dir.join("trajectory.jsonl"),
            worker_id_path: harness_dir.join("worker_id"),
            log_path: harness_dir.join("daemon.log"),
        }
    }

    /// Record a project in the registry file (atomic replace).
    pub fn register(&self, paths: &ProjectPaths) -> Result<(), RegistryError> {
        fs::create_dir_all(&self.runtime_dir)?;

        let mut doc = self.load_doc()?;
        doc.projects
            .insert(paths.project_root.clone(), paths.clone());

        let tmp_path = self.registry_path().with_extension("tmp");
        {
            let file = File::create(&tmp_path)?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, &doc)?;
            writer.flush()?;
            let file = writer.into_inner().map_err(|e| e.into_error())?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, self.registry_path())?;
        Ok(())
    }

    /// All registered projects.
    pub fn projects(&self) -> Result<BTreeMap<PathBuf, ProjectPaths>, RegistryError> {
        Ok(self.load_doc()?.projects)
    }

    fn load_doc(&self) -> Result<RegistryDoc, RegistryError> {
        let path = self.registry_path();
        if !path.exists() {
            return Ok(RegistryDoc::default());
        }
        let file = File::open(&path)?;
        let reader = BufReader::new(file);
        Ok(serde_json::from_reader(reader)?)
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
