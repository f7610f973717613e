// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test helpers for behavioral specifications.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, dead_code)]

use std::io::{BufRead, BufReader, Read, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::Duration;
use tempfile::TempDir;

/// Returns the path to a workspace binary.
///
/// The test binary lives at `target/debug/deps/specs-<hash>`, so its
/// grandparent is `target/debug/` where `harness` and `harnessd` are
/// built. Falls back to CARGO_MANIFEST_DIR for direct invocations.
pub fn binary_path(name: &str) -> PathBuf {
    if let Ok(exe) = std::env::current_exe() {
        if let Some(debug_dir) = exe.parent().and_then(|d| d.parent()) {
            let candidate = debug_dir.join(name);
            if candidate.exists() {
                return candidate;
            }
        }
    }
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("target/debug")
        .join(name)
}

/// A running daemon in a throwaway project directory.
///
/// Dropping the fixture shuts the daemon down and reaps the process.
pub struct TestDaemon {
    pub dir: TempDir,
    pub socket_path: PathBuf,
    child: Child,
}

impl TestDaemon {
    /// Spawn `harnessd` for a fresh project and wait for READY.
    pub fn start() -> Self {
        let dir = TempDir::new().unwrap();
        let socket_path = dir.path().join("daemon.sock");
        let child = spawn_daemon(dir.path(), &socket_path);
        Self {
            dir,
            socket_path,
            child,
        }
    }

    /// Shut the daemon down and start a fresh one over the same project.
    pub fn restart(&mut self) {
        self.shutdown();
        self.child = spawn_daemon(self.dir.path(), &self.socket_path);
    }

    pub fn project_root(&self) -> &Path {
        self.dir.path()
    }

    /// Send one request line, return the parsed reply.
    pub fn request(&self, request: &str) -> serde_json::Value {
        let mut stream = UnixStream::connect(&self.socket_path).unwrap();
        stream
            .set_read_timeout(Some(Duration::from_secs(10)))
            .unwrap();
        stream.write_all(request.as_bytes()).unwrap();
        stream.write_all(b"\n").unwrap();

        let line = harness_daemon::protocol::read_line(&mut stream).unwrap();
        serde_json::from_slice(&line).unwrap()
    }

    /// Send a request and unwrap the ok `data` payload.
    pub fn request_ok(&self, request: &str) -> serde_json::Value {
        let reply = self.request(request);
        assert_eq!(reply["status"], "ok", "unexpected reply: {reply}");
        reply["data"].clone()
    }

    /// A CLI command wired to this daemon.
    pub fn cli(&self) -> assert_cmd::Command {
        let mut cmd = assert_cmd::Command::new(binary_path("harness"));
        cmd.env("HARNESS_WORKTREE", self.dir.path())
            .env("HARNESS_SOCKET", &self.socket_path)
            .env("HARNESS_RUNTIME_DIR", self.dir.path().join("runtime"))
            .timeout(Duration::from_secs(30));
        cmd
    }

    fn shutdown(&mut self) {
        if let Ok(mut stream) = UnixStream::connect(&self.socket_path) {
            let _ = stream.write_all(b"{\"command\":\"shutdown\"}\n");
            let _ = stream.set_read_timeout(Some(Duration::from_secs(5)));
            let mut sink = Vec::new();
            let _ = stream.read_to_end(&mut sink);
        }
        // Reap; kill if the graceful path stalled
        for _ in 0..100 {
            if let Ok(Some(_)) = self.child.try_wait() {
                return;
            }
            std::thread::sleep(Duration::from_millis(50));
        }
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

impl Drop for TestDaemon {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Spawn `harnessd` against a project root and block until READY.
fn spawn_daemon(project_root: &Path, socket_path: &Path) -> Child {
    let mut child = Command::new(binary_path("harnessd"))
        .env("HARNESS_WORKTREE", project_root)
        .env("HARNESS_SOCKET", socket_path)
        .env("HARNESS_RUNTIME_DIR", project_root.join("runtime"))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();

    let stdout = child.stdout.take().unwrap();
    let mut reader = BufReader::new(stdout);
    let mut line = String::new();
    loop {
        line.clear();
        let n = reader.read_line(&mut line).unwrap();
        assert_ne!(n, 0, "daemon exited before READY");
        if line.trim() == "READY" {
            break;
        }
    }
    child
}

/// Initialize a git repository with one empty commit at `root`.
pub fn init_git_repo(root: &Path) {
    let run = |args: &[&str]| {
        let status = Command::new("git")
            .args(args)
            .current_dir(root)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .unwrap();
        assert!(status.success(), "git {args:?} failed");
    };
    run(&["init", "-q"]);
    run(&[
        "-c",
        "user.name=harness",
        "-c",
        "user.email=harness@test",
        "commit",
        "--allow-empty",
        "-q",
        "-m",
        "initial",
    ]);
}
