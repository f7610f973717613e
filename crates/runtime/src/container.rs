// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Container execution back-end.
//!
//! Runs commands inside a managed container through the container runtime
//! binary (docker or podman). The container user is mapped to the daemon's
//! host uid/gid so files created inside are owned by the invoking user.
//! Every absolute path crossing the boundary is translated through an
//! injected [`PathMapper`]; nothing is inherited implicitly.

use crate::executor::{execution_mutex, run_command, ExecError, ExecRequest, ExecResult, Executor};
use nix::unistd::{getegid, geteuid};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Translates absolute paths between the host and the container.
pub trait PathMapper: Send + Sync {
    fn to_container(&self, host: &Path) -> PathBuf;
    fn to_host(&self, container: &Path) -> PathBuf;
}

/// Maps a host directory prefix onto a container mount point.
///
/// Paths outside the host root are passed through unchanged.
#[derive(Debug, Clone)]
pub struct PrefixPathMapper {
    host_root: PathBuf,
    container_root: PathBuf,
}

impl PrefixPathMapper {
    pub fn new(host_root: impl Into<PathBuf>, container_root: impl Into<PathBuf>) -> Self {
        Self {
            host_root: host_root.into(),
            container_root: container_root.into(),
        }
    }

    pub fn host_root(&self) -> &Path {
        &self.host_root
    }

    pub fn container_root(&self) -> &Path {
        &self.container_root
    }

    /// The `host:container` volume flag this mapping implies.
    pub fn volume_spec(&self) -> String {
        format!(
            "{}:{}",
            self.host_root.display(),
            self.container_root.display()
        )
    }
}

impl PathMapper for PrefixPathMapper {
    fn to_container(&self, host: &Path) -> PathBuf {
        match host.strip_prefix(&self.host_root) {
            Ok(rest) => self.container_root.join(rest),
            Err(_) => host.to_path_buf(),
        }
    }

    fn to_host(&self, container: &Path) -> PathBuf {
        match container.strip_prefix(&self.container_root) {
            Ok(rest) => self.host_root.join(rest),
            Err(_) => container.to_path_buf(),
        }
    }
}

/// Spawns requests inside a managed container.
pub struct ContainerExecutor {
    /// Container runtime binary, e.g. `docker` or `podman`
    runtime: String,
    image: String,
    mapper: Arc<dyn PathMapper>,
    /// `host:container` volume specs mounted into every run
    volumes: Vec<String>,
    uid: u32,
    gid: u32,
}

impl ContainerExecutor {
    pub fn new(
        runtime: impl Into<String>,
        image: impl Into<String>,
        mapper: Arc<dyn PathMapper>,
        volumes: Vec<String>,
    ) -> Self {
        Self {
            runtime: runtime.into(),
            image: image.into(),
            mapper,
            volumes,
            uid: geteuid().as_raw(),
            gid: getegid().as_raw(),
        }
    }

    /// Convenience constructor: a single prefix mapping mounted as a volume.
    pub fn with_prefix(
        runtime: impl Into<String>,
        image: impl Into<String>,
        mapper: PrefixPathMapper,
    ) -> Self {
        let volumes = vec![mapper.volume_spec()];
        Self::new(runtime, image, Arc::new(mapper), volumes)
    }

    pub fn runtime_binary(&self) -> &str {
        &self.runtime
    }

    /// Build the full `<runtime> run` argv for a request.
    fn container_argv(&self, request: &ExecRequest) -> Vec<String> {
        let mut argv = vec![
            self.runtime.clone(),
            "run".to_string(),
            "--rm".to_string(),
            "--user".to_string(),
            format!("{}:{}", self.uid, self.gid),
        ];

        for volume in &self.volumes {
            argv.push("--volume".to_string());
            argv.push(volume.clone());
        }
        if let Some(cwd) = &request.cwd {
            argv.push("--workdir".to_string());
            argv.push(self.mapper.to_container(cwd).display().to_string());
        }
        for (key, value) in &request.env {
            argv.push("--env".to_string());
            argv.push(format!("{key}={value}"));
        }

        argv.push(self.image.clone());
        argv.extend(request.argv.iter().cloned());
        argv
    }
}

impl Executor for ContainerExecutor {
    fn execute(&self, request: &ExecRequest) -> Result<ExecResult, ExecError> {
        let _guard = request.exclusive.then(|| execution_mutex().lock());

        // The runtime process runs on the host: cwd and env travel as
        // container flags, not host process state.
        let wrapped = ExecRequest {
            argv: self.container_argv(request),
            cwd: None,
            env: BTreeMap::new(),
            exclusive: false,
            timeout: request.timeout,
        };
        run_command(&wrapped)
    }
}

#[cfg(test)]
#[path = "container_tests.rs"]
mod tests;
