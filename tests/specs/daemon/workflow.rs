// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workflow specs over the wire: claiming, failure cascades, rejection.

use crate::prelude::*;

#[test]
fn linear_dag_runs_to_completion() {
    // a → b → c, two workers pulling in turn
    let daemon = TestDaemon::start();
    daemon.request_ok(
        r#"{"command":"plan_import","plan":{"tasks":[ {"id":"a","description":"first","dependencies":[]}, {"id":"b","description":"second","dependencies":["a"]}, {"id":"c","description":"third","dependencies":["b"]} ]}}"#,
    );

    let claim = daemon.request_ok(r#"{"command":"task_claim","worker_id":"w1"}"#);
    assert_eq!(claim["task"]["id"], "a");

    let blocked = daemon.request_ok(r#"{"command":"task_claim","worker_id":"w2"}"#);
    assert_eq!(blocked["task"], serde_json::Value::Null);

    daemon.request_ok(r#"{"command":"task_complete","id":"a","worker_id":"w1"}"#);
    let claim = daemon.request_ok(r#"{"command":"task_claim","worker_id":"w2"}"#);
    assert_eq!(claim["task"]["id"], "b");

    daemon.request_ok(r#"{"command":"task_complete","id":"b","worker_id":"w2"}"#);
    let claim = daemon.request_ok(r#"{"command":"task_claim","worker_id":"w1"}"#);
    assert_eq!(claim["task"]["id"], "c");

    daemon.request_ok(r#"{"command":"task_complete","id":"c","worker_id":"w1"}"#);
    let check = daemon.request_ok(r#"{"command":"check_state"}"#);
    assert_eq!(check["ok"], true);
}

#[test]
fn diamond_failure_skips_the_join_but_not_the_sibling() {
    // s; x:(s); y:(s); j:(x,y)
    let daemon = TestDaemon::start();
    daemon.request_ok(
        r#"{"command":"plan_import","plan":{"tasks":[ {"id":"s","description":"setup","dependencies":[]}, {"id":"x","description":"left","dependencies":["s"]}, {"id":"y","description":"right","dependencies":["s"]}, {"id":"j","description":"join","dependencies":["x","y"]} ]}}"#,
    );

    daemon.request_ok(r#"{"command":"task_claim","worker_id":"w1"}"#);
    daemon.request_ok(r#"{"command":"task_complete","id":"s","worker_id":"w1"}"#);
    let claim = daemon.request_ok(r#"{"command":"task_claim","worker_id":"w1"}"#);
    assert_eq!(claim["task"]["id"], "x");

    daemon
        .request_ok(r#"{"command":"task_fail","id":"x","worker_id":"w1","reason":"boom"}"#);

    // j is skipped immediately, before y starts
    let state = daemon.request_ok(r#"{"command":"get_state"}"#);
    assert_eq!(state["tasks"]["j"]["status"], "skipped");
    assert_eq!(state["tasks"]["j"]["reason"], "dependency_failed:x");
    assert_eq!(state["tasks"]["x"]["reason"], "boom");

    // y remains claimable
    let claim = daemon.request_ok(r#"{"command":"task_claim","worker_id":"w2"}"#);
    assert_eq!(claim["task"]["id"], "y");
}

#[test]
fn cyclic_plan_is_rejected_with_the_cycle_path() {
    let daemon = TestDaemon::start();
    let reply = daemon.request(
        r#"{"command":"plan_import","plan":{"tasks":[ {"id":"a","description":"","dependencies":["b"]}, {"id":"b","description":"","dependencies":["a"]} ]}}"#,
    );
    assert_eq!(reply["status"], "error");
    assert_eq!(reply["code"], "cycle_detected");
    let message = reply["message"].as_str().unwrap();
    assert!(message.contains('a') && message.contains('b'));

    // No state change on disk
    let state = daemon.request_ok(r#"{"command":"get_state"}"#);
    assert_eq!(state["tasks"], serde_json::json!({}));
    assert!(!daemon.project_root().join(".harness/state.json").exists());
}

#[test]
fn repeated_claims_renew_the_same_lease() {
    // Deadline behavior is covered in the manager tests; this checks the wire
    let daemon = TestDaemon::start();
    daemon.request_ok(
        r#"{"command":"plan_import","plan":{"tasks":[ {"id":"a","description":"only","dependencies":[]} ]}}"#,
    );

    let first = daemon.request_ok(r#"{"command":"task_claim","worker_id":"w1"}"#);
    std::thread::sleep(std::time::Duration::from_millis(50));
    let second = daemon.request_ok(r#"{"command":"task_claim","worker_id":"w1"}"#);

    assert_eq!(second["task"]["id"], "a");
    let t0 = first["task"]["started_at"].as_str().unwrap();
    let t1 = second["task"]["started_at"].as_str().unwrap();
    assert!(t1 > t0, "started_at must advance on renewal: {t0} vs {t1}");
}

#[test]
fn update_state_is_visible_in_snapshots() {
    let daemon = TestDaemon::start();
    daemon.request_ok(r#"{"command":"update_state","fields":{"current_phase":"build"}}"#);
    let state = daemon.request_ok(r#"{"command":"get_state"}"#);
    assert_eq!(state["current_phase"], "build");

    let summary = daemon.request_ok(r#"{"command":"session_start"}"#);
    assert_eq!(summary["meta"]["current_phase"], "build");
}

#[test]
fn trajectory_records_the_claim_order() {
    let daemon = TestDaemon::start();
    daemon.request_ok(
        r#"{"command":"plan_import","plan":{"tasks":[ {"id":"a","description":"first","dependencies":[]}, {"id":"b","description":"second","dependencies":["a"]} ]}}"#,
    );
    daemon.request_ok(r#"{"command":"task_claim","worker_id":"w1"}"#);
    daemon.request_ok(r#"{"command":"task_complete","id":"a","worker_id":"w1"}"#);
    daemon.request_ok(r#"{"command":"task_claim","worker_id":"w2"}"#);

    let contents =
        std::fs::read_to_string(daemon.project_root().join(".harness/trajectory.jsonl"))
            .unwrap();
    let events: Vec<serde_json::Value> = contents
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();

    let claims: Vec<(&str, &str)> = events
        .iter()
        .filter(|e| e["event"] == "task_claimed")
        .map(|e| {
            (
                e["task_id"].as_str().unwrap(),
                e["worker_id"].as_str().unwrap(),
            )
        })
        .collect();
    assert_eq!(claims, vec![("a", "w1"), ("b", "w2")]);
}
