// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Trajectory event records
//!
//! One record per consequential state transition or subprocess invocation,
//! persisted as a single JSON line. `timestamp` is monotonic seconds since
//! the log was opened; `wall_time` is UTC. Both are stamped by the log at
//! append time.

use crate::id::TaskId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single entry in the append-only trajectory log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrajectoryEvent {
    /// Event tag, e.g. `task_claimed`, `plan_imported`, `exec`
    pub event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<TaskId>,
    /// Monotonic seconds since the log was opened
    #[serde(default)]
    pub timestamp: f64,
    /// UTC wall-clock time, ISO-8601
    #[serde(default = "unix_epoch")]
    pub wall_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Free-form payload, flattened into the record
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

fn unix_epoch() -> DateTime<Utc> {
    DateTime::<Utc>::default()
}

impl TrajectoryEvent {
    pub fn new(event: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            task_id: None,
            timestamp: 0.0,
            wall_time: unix_epoch(),
            duration_ms: None,
            reason: None,
            extra: BTreeMap::new(),
        }
    }

    pub fn task(mut self, id: impl Into<TaskId>) -> Self {
        self.task_id = Some(id.into());
        self
    }

    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn duration_ms(mut self, ms: u64) -> Self {
        self.duration_ms = Some(ms);
        self
    }

    /// Attach a payload field.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
