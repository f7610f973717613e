// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon lifecycle specs: startup, conflict, shutdown.

use crate::prelude::*;
use std::process::{Command, Stdio};

#[test]
fn daemon_starts_and_answers_ping() {
    let daemon = TestDaemon::start();
    let data = daemon.request_ok(r#"{"command":"ping"}"#);
    assert_eq!(data["pong"], true);
    assert!(data["version"].is_string());
}

#[test]
fn second_daemon_for_the_same_project_refuses_to_start() {
    let daemon = TestDaemon::start();

    let output = Command::new(binary_path("harnessd"))
        .env("HARNESS_WORKTREE", daemon.project_root())
        .env("HARNESS_SOCKET", daemon.project_root().join("other.sock"))
        .env(
            "HARNESS_RUNTIME_DIR",
            daemon.project_root().join("runtime"),
        )
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .unwrap();

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("already running"), "stderr: {stderr}");
}

#[test]
fn shutdown_removes_the_socket_and_pid_files() {
    let daemon = TestDaemon::start();
    let socket_path = daemon.socket_path.clone();

    let data = daemon.request_ok(r#"{"command":"shutdown"}"#);
    assert_eq!(data["stopping"], true);

    // Wait for the process to exit and clean up
    for _ in 0..100 {
        if !socket_path.exists() {
            break;
        }
        std::thread::sleep(std::time::Duration::from_millis(50));
    }
    assert!(!socket_path.exists());
}

#[test]
fn state_files_live_under_the_project_harness_dir() {
    let daemon = TestDaemon::start();
    daemon.request_ok(
        r#"{"command":"plan_import","plan":{"tasks":[ {"id":"a","description":"only","dependencies":[]} ]}}"#,
    );

    let harness_dir = daemon.project_root().join(".harness");
    assert!(harness_dir.join("state.json").exists());
    assert!(harness_dir.join("trajectory.jsonl").exists());
    assert!(harness_dir.join("worker_id").exists());
}

#[test]
fn worker_id_is_stable_across_daemon_restarts() {
    let mut daemon = TestDaemon::start();
    let first = daemon.request_ok(r#"{"command":"worker_id"}"#);

    daemon.restart();
    let second = daemon.request_ok(r#"{"command":"worker_id"}"#);
    assert_eq!(first["worker_id"], second["worker_id"]);
}

#[test]
fn workflow_state_survives_a_daemon_restart() {
    // What was persisted is exactly what the next daemon sees
    let mut daemon = TestDaemon::start();
    daemon.request_ok(
        r#"{"command":"plan_import","plan":{"tasks":[ {"id":"a","description":"first","dependencies":[]}, {"id":"b","description":"second","dependencies":["a"]} ]}}"#,
    );
    daemon.request_ok(r#"{"command":"task_claim","worker_id":"w1"}"#);

    daemon.restart();
    let state = daemon.request_ok(r#"{"command":"get_state"}"#);
    assert_eq!(state["tasks"]["a"]["status"], "running");
    assert_eq!(state["tasks"]["a"]["claimed_by"], "w1");
    assert_eq!(state["tasks"]["b"]["status"], "pending");
}
