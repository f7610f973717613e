// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workflow state: the task DAG plus its scalar metadata bag

use crate::graph::detect_cycle;
use crate::id::TaskId;
use crate::meta::MetaValue;
use crate::task::{Task, TaskInvariantError};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// The complete per-project workflow state.
///
/// Task iteration order is insertion order; claim selection depends on it.
/// Unknown scalar top-level fields are captured into `meta` rather than
/// rejected, so state files written by newer versions stay loadable.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct WorkflowState {
    #[serde(default)]
    pub tasks: IndexMap<TaskId, Task>,
    /// Open string-keyed scalar metadata (e.g. `current_phase`, `last_commit`)
    #[serde(flatten)]
    pub meta: BTreeMap<String, MetaValue>,
}

impl WorkflowState {
    /// Ids of the tasks that directly depend on `id`.
    ///
    /// Computed by inverting `dependencies` on demand; the graph is small
    /// and mutations are rare, so no back-links are stored.
    pub fn dependents(&self, id: &TaskId) -> Vec<TaskId> {
        self.tasks
            .values()
            .filter(|t| t.dependencies.iter().any(|d| d == id))
            .map(|t| t.id.clone())
            .collect()
    }

    /// Ids of all transitive dependents of `id`, deduplicated, excluding
    /// `id` itself.
    pub fn transitive_dependents(&self, id: &TaskId) -> Vec<TaskId> {
        let mut out: Vec<TaskId> = Vec::new();
        let mut frontier = vec![id.clone()];
        while let Some(current) = frontier.pop() {
            for dep in self.dependents(&current) {
                if dep != *id && !out.contains(&dep) {
                    out.push(dep.clone());
                    frontier.push(dep);
                }
            }
        }
        out
    }

    /// The dependency adjacency map for cycle detection.
    pub fn adjacency(&self) -> IndexMap<TaskId, Vec<TaskId>> {
        self.tasks
            .iter()
            .map(|(id, t)| (id.clone(), t.dependencies.clone()))
            .collect()
    }

    /// Validate all task invariants, dependency closure, and acyclicity.
    pub fn validate(&self) -> Result<(), WorkflowError> {
        for (id, task) in &self.tasks {
            if *id != task.id {
                return Err(WorkflowError::IdMismatch {
                    key: id.clone(),
                    task: task.id.clone(),
                });
            }
            task.check_invariants()?;
            for dep in &task.dependencies {
                if !self.tasks.contains_key(dep) {
                    return Err(WorkflowError::UnknownDependency {
                        task: id.clone(),
                        dependency: dep.clone(),
                    });
                }
            }
        }

        if let Some(path) = detect_cycle(&self.adjacency()) {
            return Err(WorkflowError::Cycle { path });
        }

        Ok(())
    }

    /// Deep copy of the state for read-only inspection.
    pub fn snapshot(&self) -> Self {
        self.clone()
    }
}

/// Validation failures for a whole workflow.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Invariant(#[from] TaskInvariantError),

    #[error("task map key {key} does not match task id {task}")]
    IdMismatch { key: TaskId, task: TaskId },

    #[error("task {task} depends on unknown task {dependency}")]
    UnknownDependency { task: TaskId, dependency: TaskId },

    #[error("dependency cycle: {}", format_cycle(path))]
    Cycle { path: Vec<TaskId> },
}

pub(crate) fn format_cycle(path: &[TaskId]) -> String {
    path.iter()
        .map(TaskId::as_str)
        .collect::<Vec<_>>()
        .join(" -> ")
}

#[cfg(test)]
#[path = "workflow_tests.rs"]
mod tests;
