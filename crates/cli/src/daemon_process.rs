// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Spawning `harnessd` and waiting for readiness.

use anyhow::{bail, Context, Result};
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

/// How long to wait for the daemon's READY marker.
const STARTUP_TIMEOUT: Duration = Duration::from_secs(15);

/// Locate `harnessd`: next to this binary first, then on PATH.
fn daemon_binary() -> PathBuf {
    if let Ok(current) = std::env::current_exe() {
        if let Some(dir) = current.parent() {
            let sibling = dir.join("harnessd");
            if sibling.exists() {
                return sibling;
            }
        }
    }
    PathBuf::from("harnessd")
}

/// Start the project daemon and block until it prints READY.
///
/// The child keeps running after this returns; it owns its own lifetime
/// and exits on a `shutdown` request.
pub fn start() -> Result<()> {
    let binary = daemon_binary();
    let mut child = Command::new(&binary)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .with_context(|| format!("cannot spawn {}", binary.display()))?;

    let stdout = child
        .stdout
        .take()
        .context("daemon stdout was not captured")?;
    let mut reader = BufReader::new(stdout);
    let deadline = Instant::now() + STARTUP_TIMEOUT;

    let mut line = String::new();
    loop {
        line.clear();
        let n = reader
            .read_line(&mut line)
            .context("reading daemon startup output")?;
        if n == 0 {
            // Daemon exited before READY (e.g. already running)
            let status = child.wait()?;
            bail!("daemon exited during startup with {status}");
        }
        if line.trim() == "READY" {
            return Ok(());
        }
        if Instant::now() > deadline {
            bail!("daemon did not become ready within {STARTUP_TIMEOUT:?}");
        }
    }
}
