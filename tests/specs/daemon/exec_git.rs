// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Exec and git specs over the wire.

use crate::prelude::*;

#[test]
fn exec_runs_in_the_project_root_by_default() {
    let daemon = TestDaemon::start();
    std::fs::write(daemon.project_root().join("marker.txt"), "here").unwrap();

    let data = daemon.request_ok(r#"{"command":"exec","argv":["ls"]}"#);
    assert_eq!(data["return_code"], 0);
    assert!(data["stdout"].as_str().unwrap().contains("marker.txt"));
}

#[test]
fn exec_reports_exit_codes_and_stderr() {
    let daemon = TestDaemon::start();
    let data = daemon.request_ok(
        r#"{"command":"exec","argv":["sh","-c","echo bad >&2; exit 7"]}"#,
    );
    assert_eq!(data["return_code"], 7);
    assert_eq!(data["stderr"], "bad\n");
}

#[test]
fn exec_timeout_kills_and_reports() {
    let daemon = TestDaemon::start();
    let data = daemon.request_ok(
        r#"{"command":"exec","argv":["sleep","30"],"timeout":1}"#,
    );
    assert_eq!(data["reason"], "timeout");
    assert!(data["return_code"].as_i64().unwrap() != 0);
}

#[test]
fn exec_failures_use_the_execution_error_code() {
    let daemon = TestDaemon::start();
    let reply = daemon.request(r#"{"command":"exec","argv":["harness-no-such-binary"]}"#);
    assert_eq!(reply["status"], "error");
    assert_eq!(reply["code"], "execution_error");
}

#[test]
fn git_works_against_a_real_repository() {
    let daemon = TestDaemon::start();
    init_git_repo(daemon.project_root());

    let data = daemon.request_ok(r#"{"command":"git","argv":["status","--porcelain"]}"#);
    assert_eq!(data["return_code"], 0);
}

#[test]
fn destructive_git_is_denied_without_opt_in() {
    let daemon = TestDaemon::start();
    init_git_repo(daemon.project_root());

    let reply = daemon.request(r#"{"command":"git","argv":["push","--force"]}"#);
    assert_eq!(reply["status"], "error");
    assert_eq!(reply["code"], "invalid_request");
    assert!(reply["message"].as_str().unwrap().contains("destructive"));
}

#[test]
fn check_commit_follows_the_recorded_last_commit() {
    let daemon = TestDaemon::start();
    init_git_repo(daemon.project_root());

    // Fresh metadata: any HEAD counts as new work
    let allowed = daemon.request_ok(r#"{"command":"check_commit"}"#);
    assert_eq!(allowed["ok"], true);
    let head = allowed["head"].as_str().unwrap().to_string();

    // Record HEAD, then deny until a new commit appears
    let update =
        format!(r#"{{"command":"update_state","fields":{{"last_commit":"{head}"}}}}"#);
    daemon.request_ok(&update);
    let denied = daemon.request_ok(r#"{"command":"check_commit"}"#);
    assert_eq!(denied["ok"], false);
    assert_eq!(denied["reason"], "no_new_commit");
}
