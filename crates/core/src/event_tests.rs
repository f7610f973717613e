// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;

#[test]
fn builder_sets_fields() {
    let event = TrajectoryEvent::new("task_claimed")
        .task("build")
        .reason("timeout")
        .duration_ms(120)
        .with("worker_id", "w-1");

    assert_eq!(event.event, "task_claimed");
    assert_eq!(event.task_id, Some(TaskId::new("build")));
    assert_eq!(event.reason.as_deref(), Some("timeout"));
    assert_eq!(event.duration_ms, Some(120));
    assert_eq!(event.extra["worker_id"], json!("w-1"));
}

#[test]
fn extra_payload_flattens_into_the_record() {
    let event = TrajectoryEvent::new("exec").with("argv", json!(["git", "status"]));
    let value = serde_json::to_value(&event).unwrap();
    assert_eq!(value["event"], "exec");
    assert_eq!(value["argv"], json!(["git", "status"]));
    // Absent optionals are omitted entirely
    assert!(value.get("task_id").is_none());
    assert!(value.get("duration_ms").is_none());
}

#[test]
fn record_round_trips() {
    let event = TrajectoryEvent::new("plan_imported").with("task_count", 3);
    let line = serde_json::to_string(&event).unwrap();
    let back: TrajectoryEvent = serde_json::from_str(&line).unwrap();
    assert_eq!(back, event);
}

#[test]
fn tolerates_minimal_records() {
    let back: TrajectoryEvent = serde_json::from_str(r#"{"event":"ping"}"#).unwrap();
    assert_eq!(back.event, "ping");
    assert_eq!(back.timestamp, 0.0);
}
