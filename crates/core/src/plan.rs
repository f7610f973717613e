// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Plan description accepted by `plan_import`

use crate::graph::detect_cycle;
use crate::id::TaskId;
use crate::meta::MetaValue;
use crate::task::{Task, TaskStatus, DEFAULT_TIMEOUT_SECONDS};
use crate::workflow::{format_cycle, WorkflowState};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A task as listed in an imported plan.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlanTask {
    pub id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
}

/// A full plan: the DAG description that replaces the workflow on import.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Plan {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal: Option<String>,
    #[serde(default)]
    pub tasks: Vec<PlanTask>,
}

impl Plan {
    /// Validate id uniqueness, dependency closure, and acyclicity.
    pub fn validate(&self) -> Result<(), PlanError> {
        if self.tasks.is_empty() {
            return Err(PlanError::Empty);
        }

        let mut adjacency: IndexMap<TaskId, Vec<TaskId>> = IndexMap::new();
        for task in &self.tasks {
            if task.id.is_empty() {
                return Err(PlanError::EmptyId);
            }
            if task.timeout_seconds == Some(0) {
                return Err(PlanError::ZeroTimeout {
                    task: task.id.clone(),
                });
            }
            let id = TaskId::new(task.id.clone());
            let deps: Vec<TaskId> = task
                .dependencies
                .iter()
                .map(|d| TaskId::new(d.clone()))
                .collect();
            if adjacency.insert(id, deps).is_some() {
                return Err(PlanError::DuplicateId {
                    task: task.id.clone(),
                });
            }
        }

        for task in &self.tasks {
            for dep in &task.dependencies {
                if !adjacency.contains_key(dep.as_str()) {
                    return Err(PlanError::UnknownDependency {
                        task: task.id.clone(),
                        dependency: dep.clone(),
                    });
                }
            }
        }

        if let Some(path) = detect_cycle(&adjacency) {
            return Err(PlanError::Cycle { path });
        }

        Ok(())
    }

    /// Build the fresh workflow state this plan describes.
    ///
    /// All tasks start `pending`; the plan goal lands in the metadata bag.
    /// Call [`Plan::validate`] first; this does not re-check.
    pub fn into_workflow(self) -> WorkflowState {
        let mut state = WorkflowState::default();
        if let Some(goal) = self.goal {
            state.meta.insert("goal".to_string(), MetaValue::Str(goal));
        }
        for plan_task in self.tasks {
            let id = TaskId::new(plan_task.id);
            let task = Task {
                id: id.clone(),
                description: plan_task.description,
                status: TaskStatus::Pending,
                dependencies: plan_task.dependencies.into_iter().map(TaskId::new).collect(),
                claimed_by: None,
                started_at: None,
                completed_at: None,
                timeout_seconds: plan_task.timeout_seconds.unwrap_or(DEFAULT_TIMEOUT_SECONDS),
                role: plan_task.role,
                instructions: plan_task.instructions,
                reason: None,
            };
            state.tasks.insert(id, task);
        }
        state
    }
}

/// Plan rejection reasons.
#[derive(Debug, Error, PartialEq)]
pub enum PlanError {
    #[error("plan has no tasks")]
    Empty,

    #[error("plan contains a task with an empty id")]
    EmptyId,

    #[error("task {task}: timeout_seconds must be positive")]
    ZeroTimeout { task: String },

    #[error("duplicate task id {task}")]
    DuplicateId { task: String },

    #[error("task {task} depends on unknown task {dependency}")]
    UnknownDependency { task: String, dependency: String },

    #[error("dependency cycle: {}", format_cycle(path))]
    Cycle { path: Vec<TaskId> },
}

#[cfg(test)]
#[path = "plan_tests.rs"]
mod tests;
