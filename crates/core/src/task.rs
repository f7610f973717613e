// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task record and status machine

use crate::id::{TaskId, WorkerId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default lease timeout for a running task, in seconds.
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 600;

fn default_timeout_seconds() -> u64 {
    DEFAULT_TIMEOUT_SECONDS
}

/// Status of a task through its lifecycle.
///
/// `Completed`, `Failed`, and `Skipped` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Skipped
        )
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::Running => write!(f, "running"),
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Failed => write!(f, "failed"),
            TaskStatus::Skipped => write!(f, "skipped"),
        }
    }
}

/// A single node in the workflow DAG.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    #[serde(default)]
    pub description: String,
    pub status: TaskStatus,
    /// Ordered set of upstream task ids that must complete first
    #[serde(default)]
    pub dependencies: Vec<TaskId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claimed_by: Option<WorkerId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    /// Why the terminal status was reached (e.g. "timeout",
    /// "dependency_failed:build")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl Task {
    /// Create a pending task with default timeout and no dependencies.
    pub fn new(id: impl Into<TaskId>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            status: TaskStatus::Pending,
            dependencies: Vec::new(),
            claimed_by: None,
            started_at: None,
            completed_at: None,
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
            role: None,
            instructions: None,
            reason: None,
        }
    }

    /// Check the per-task status invariants.
    pub fn check_invariants(&self) -> Result<(), TaskInvariantError> {
        if self.id.is_empty() {
            return Err(TaskInvariantError::EmptyId);
        }
        if self.timeout_seconds == 0 {
            return Err(TaskInvariantError::ZeroTimeout {
                task: self.id.clone(),
            });
        }
        match self.status {
            TaskStatus::Pending => {
                if self.claimed_by.is_some() || self.started_at.is_some() {
                    return Err(TaskInvariantError::PendingWithClaim {
                        task: self.id.clone(),
                    });
                }
            }
            TaskStatus::Running => {
                if self.claimed_by.is_none() || self.started_at.is_none() {
                    return Err(TaskInvariantError::RunningWithoutClaim {
                        task: self.id.clone(),
                    });
                }
            }
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Skipped => {
                if self.completed_at.is_none() {
                    return Err(TaskInvariantError::TerminalWithoutCompletedAt {
                        task: self.id.clone(),
                        status: self.status,
                    });
                }
            }
        }
        Ok(())
    }
}

/// Violations of the per-task status invariants.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TaskInvariantError {
    #[error("task id must not be empty")]
    EmptyId,

    #[error("task {task}: timeout_seconds must be positive")]
    ZeroTimeout { task: TaskId },

    #[error("task {task}: pending tasks must not carry a claim or start time")]
    PendingWithClaim { task: TaskId },

    #[error("task {task}: running tasks must carry claimed_by and started_at")]
    RunningWithoutClaim { task: TaskId },

    #[error("task {task}: {status} tasks must carry completed_at")]
    TerminalWithoutCompletedAt { task: TaskId, status: TaskStatus },
}

#[cfg(test)]
#[path = "task_tests.rs"]
mod tests;
