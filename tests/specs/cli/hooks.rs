// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! CLI specs: exit codes and output shape of the thin client.

use crate::prelude::*;

#[test]
fn ping_succeeds_against_a_running_daemon() {
    let daemon = TestDaemon::start();
    let assert = daemon.cli().args(["ping"]).assert().success();
    let stdout = String::from_utf8_lossy(&assert.get_output().stdout).to_string();
    assert!(stdout.contains("\"pong\": true"), "stdout: {stdout}");
}

#[test]
fn ping_fails_cleanly_without_a_daemon() {
    let dir = tempfile::TempDir::new().unwrap();
    let mut cmd = assert_cmd::Command::new(binary_path("harness"));
    cmd.env("HARNESS_SOCKET", dir.path().join("absent.sock"))
        .env("HARNESS_WORKTREE", dir.path())
        .args(["ping"]);
    let assert = cmd.assert().failure();
    let stderr = String::from_utf8_lossy(&assert.get_output().stderr).to_string();
    assert!(stderr.contains("is it running?"), "stderr: {stderr}");
}

#[test]
fn check_state_exit_code_tracks_the_deny_decision() {
    let daemon = TestDaemon::start();

    // Empty workflow: vacuously ok
    daemon.cli().args(["check-state"]).assert().success();

    daemon.request_ok(
        r#"{"command":"plan_import","plan":{"tasks":[ {"id":"a","description":"only","dependencies":[]} ]}}"#,
    );

    // Pending work: deny with exit code 2 and a machine-readable reason
    let assert = daemon.cli().args(["check-state"]).assert().code(2);
    let stdout = String::from_utf8_lossy(&assert.get_output().stdout).to_string();
    assert!(stdout.contains("tasks_incomplete"), "stdout: {stdout}");

    // Drive the task to a terminal state: allow again
    daemon.request_ok(r#"{"command":"task_claim","worker_id":"w1"}"#);
    daemon.request_ok(r#"{"command":"task_complete","id":"a","worker_id":"w1"}"#);
    daemon.cli().args(["check-state"]).assert().success();
}

#[test]
fn claim_resolves_the_project_worker_id_by_default() {
    let daemon = TestDaemon::start();
    daemon.request_ok(
        r#"{"command":"plan_import","plan":{"tasks":[ {"id":"a","description":"only","dependencies":[]} ]}}"#,
    );

    let assert = daemon.cli().args(["claim"]).assert().success();
    let stdout = String::from_utf8_lossy(&assert.get_output().stdout).to_string();
    let data: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(data["task"]["id"], "a");

    // The claimant is the daemon's stable worker id
    let worker = daemon.request_ok(r#"{"command":"worker_id"}"#);
    assert_eq!(data["task"]["claimed_by"], worker["worker_id"]);
}

#[test]
fn plan_import_reads_a_file() {
    let daemon = TestDaemon::start();
    let plan_path = daemon.project_root().join("plan.json");
    std::fs::write(
        &plan_path,
        r#"{"goal":"demo","tasks":[{"id":"a","description":"only","dependencies":[]}]}"#,
    )
    .unwrap();

    daemon
        .cli()
        .args(["plan", "import"])
        .arg(&plan_path)
        .assert()
        .success();

    let state = daemon.request_ok(r#"{"command":"get_state"}"#);
    assert_eq!(state["tasks"]["a"]["status"], "pending");
    assert_eq!(state["goal"], "demo");
}

#[test]
fn shutdown_via_cli_stops_the_daemon() {
    let daemon = TestDaemon::start();
    daemon.cli().args(["shutdown"]).assert().success();

    for _ in 0..100 {
        if !daemon.socket_path.exists() {
            return;
        }
        std::thread::sleep(std::time::Duration::from_millis(50));
    }
    panic!("daemon did not clean up after CLI shutdown");
}
