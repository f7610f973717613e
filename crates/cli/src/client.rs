// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Socket client: one request, one reply, no domain logic.

use anyhow::{bail, Context, Result};
use harness_daemon::{protocol, Registry, Reply, Request};
use std::io::Write;
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::time::Duration;

/// Default connect/read timeout, overridable via `HARNESS_TIMEOUT` seconds.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection parameters for the per-project daemon.
pub struct Client {
    socket_path: PathBuf,
    timeout: Duration,
}

impl Client {
    /// Client for an explicit socket path.
    pub fn new(socket_path: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            socket_path: socket_path.into(),
            timeout,
        }
    }

    /// Resolve the socket for the current project.
    ///
    /// `HARNESS_SOCKET` overrides the path outright; otherwise it derives
    /// from the project root (`HARNESS_WORKTREE` or the working directory)
    /// through the registry hash.
    pub fn for_project() -> Result<Self> {
        let socket_path = match std::env::var_os("HARNESS_SOCKET") {
            Some(path) => PathBuf::from(path),
            None => {
                let project_root = match std::env::var_os("HARNESS_WORKTREE") {
                    Some(dir) => PathBuf::from(dir),
                    None => std::env::current_dir()?,
                };
                let project_root = project_root.canonicalize().unwrap_or(project_root);
                Registry::new()?.paths_for(&project_root).socket_path
            }
        };

        let timeout = std::env::var("HARNESS_TIMEOUT")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TIMEOUT);

        Ok(Self {
            socket_path,
            timeout,
        })
    }

    pub fn socket_path(&self) -> &std::path::Path {
        &self.socket_path
    }

    /// Send one request and read the reply.
    pub fn call(&self, request: &Request) -> Result<Reply> {
        let mut stream = UnixStream::connect(&self.socket_path).with_context(|| {
            format!(
                "cannot reach the harness daemon at {} (is it running?)",
                self.socket_path.display()
            )
        })?;
        stream.set_read_timeout(Some(self.timeout))?;
        stream.set_write_timeout(Some(self.timeout))?;

        let mut line = serde_json::to_vec(request)?;
        line.push(b'\n');
        stream.write_all(&line)?;

        let reply_line = protocol::read_line(&mut stream)
            .context("daemon closed the connection without replying")?;
        Ok(serde_json::from_slice(&reply_line)?)
    }

    /// Call and unwrap the `data` payload, converting error replies into
    /// process-level failures.
    pub fn call_ok(&self, request: &Request) -> Result<serde_json::Value> {
        match self.call(request)? {
            Reply::Ok { data } => Ok(data),
            Reply::Error { code, message } => bail!("{code}: {message}"),
        }
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
