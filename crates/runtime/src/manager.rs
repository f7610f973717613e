// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Authoritative workflow state with crash-atomic persistence.
//!
//! All mutations run under a single state mutex: compute the new state,
//! persist it atomically through [`StateFile`], release the mutex, and only
//! then append trajectory events (release-then-log). Trajectory failures
//! never fail a mutation that has already committed.

use chrono::{DateTime, Utc};
use harness_core::{
    Clock, MetaValue, Plan, PlanError, Task, TaskId, TaskStatus, TrajectoryEvent, WorkerId,
    WorkflowState,
};
use harness_storage::{StateFile, StateFileError, TrajectoryLog};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

/// Errors from state manager operations.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("unknown task {0}")]
    NotFound(TaskId),

    #[error("invalid transition for task {task}: {message}")]
    InvalidTransition { task: TaskId, message: String },

    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error("cannot set reserved metadata key {key}")]
    ReservedMetadataKey { key: String },

    #[error("metadata value for {key} must be a scalar")]
    NonScalarMetadata { key: String },

    #[error(transparent)]
    Persistence(#[from] StateFileError),
}

struct Inner {
    state: WorkflowState,
    store: StateFile,
}

impl Inner {
    /// Persist the in-memory state, restoring `previous` on failure.
    ///
    /// A failed save aborts before the rename, so the on-disk file keeps
    /// the pre-image; rolling memory back keeps the two in agreement.
    fn commit(&mut self, previous: WorkflowState) -> Result<(), StateError> {
        if let Err(e) = self.store.save(&self.state) {
            self.state = previous;
            return Err(e.into());
        }
        Ok(())
    }
}

/// Thread-safe manager for the workflow DAG.
pub struct StateManager<C: Clock> {
    inner: Mutex<Inner>,
    trajectory: Arc<TrajectoryLog>,
    clock: C,
}

impl<C: Clock> StateManager<C> {
    /// Load (or initialize) the workflow from `store`.
    pub fn open(
        store: StateFile,
        trajectory: Arc<TrajectoryLog>,
        clock: C,
    ) -> Result<Self, StateError> {
        let state = store.load()?;
        Ok(Self {
            inner: Mutex::new(Inner { state, store }),
            trajectory,
            clock,
        })
    }

    /// Deep copy of the current state for read-only inspection.
    pub fn get_state(&self) -> WorkflowState {
        self.inner.lock().state.snapshot()
    }

    /// Replace the workflow with the DAG described by `plan`.
    ///
    /// Rejects duplicate ids, unknown dependencies, empty plans, and
    /// cycles before any state is touched.
    pub fn import_plan(&self, plan: Plan) -> Result<usize, StateError> {
        plan.validate()?;
        let task_count;
        {
            let mut inner = self.inner.lock();
            let previous = std::mem::replace(&mut inner.state, plan.into_workflow());
            task_count = inner.state.tasks.len();
            inner.commit(previous)?;
        }
        self.log(TrajectoryEvent::new("plan_imported").with("task_count", task_count));
        Ok(task_count)
    }

    /// Clear the workflow state entirely.
    pub fn reset(&self) -> Result<(), StateError> {
        {
            let mut inner = self.inner.lock();
            let previous = std::mem::replace(&mut inner.state, WorkflowState::default());
            inner.commit(previous)?;
        }
        self.log(TrajectoryEvent::new("plan_reset"));
        Ok(())
    }

    /// Claim the next runnable task for `worker`.
    ///
    /// In order, under the state mutex: renew an existing lease held by
    /// this worker; sweep expired leases (failing them and skipping their
    /// dependents); select the first pending task in insertion order whose
    /// dependencies are all completed; claim it. A single atomic persist
    /// covers the sweep and the claim.
    pub fn claim_task(&self, worker: &WorkerId) -> Result<Option<Task>, StateError> {
        let now = self.clock.now_utc();
        let mut events: Vec<TrajectoryEvent> = Vec::new();
        let claimed: Option<Task>;
        {
            let mut inner = self.inner.lock();

            // 1. Idempotency / lease renewal. A deliberate write: returning
            // the stale started_at would let another worker steal the task
            // at expiry.
            let held = inner
                .state
                .tasks
                .values()
                .find(|t| t.status == TaskStatus::Running && t.claimed_by.as_ref() == Some(worker))
                .map(|t| t.id.clone());
            if let Some(id) = held {
                let previous = inner.state.clone();
                if let Some(task) = inner.state.tasks.get_mut(&id) {
                    task.started_at = Some(now);
                }
                inner.commit(previous)?;
                let task = inner.state.tasks.get(&id).cloned();
                drop(inner);
                self.log(
                    TrajectoryEvent::new("task_claimed")
                        .task(id)
                        .with("worker_id", worker.as_str())
                        .with("renewed", true),
                );
                return Ok(task);
            }

            let previous = inner.state.clone();

            // 2. Timeout sweep.
            events.extend(sweep_expired(&mut inner.state, now));

            // 3-4. Selection and claim.
            let selected = select_claimable(&inner.state);
            if let Some(id) = &selected {
                if let Some(task) = inner.state.tasks.get_mut(id) {
                    task.status = TaskStatus::Running;
                    task.claimed_by = Some(worker.clone());
                    task.started_at = Some(now);
                }
                events.push(
                    TrajectoryEvent::new("task_claimed")
                        .task(id.clone())
                        .with("worker_id", worker.as_str()),
                );
            }

            if !events.is_empty() {
                inner.commit(previous)?;
            }
            claimed = selected.and_then(|id| inner.state.tasks.get(&id).cloned());
        }

        // 5. Release, then log.
        for event in events {
            self.log(event);
        }
        Ok(claimed)
    }

    /// Terminal transition to `completed`.
    ///
    /// Requires the task to be running and claimed by `worker`. Skips are
    /// never introduced here; they arise only from failure.
    pub fn complete_task(
        &self,
        id: &TaskId,
        worker: &WorkerId,
        reason: Option<String>,
    ) -> Result<Task, StateError> {
        let now = self.clock.now_utc();
        let completed;
        {
            let mut inner = self.inner.lock();
            require_owned_running(&inner.state, id, worker)?;
            let previous = inner.state.clone();
            if let Some(task) = inner.state.tasks.get_mut(id) {
                task.status = TaskStatus::Completed;
                task.completed_at = Some(now);
                task.reason = reason;
            }
            inner.commit(previous)?;
            completed = inner.state.tasks.get(id).cloned();
        }
        self.log(
            TrajectoryEvent::new("task_completed")
                .task(id.clone())
                .with("worker_id", worker.as_str()),
        );
        completed.ok_or_else(|| StateError::NotFound(id.clone()))
    }

    /// Terminal transition to `failed`, with immediate transitive skip
    /// propagation to dependents.
    pub fn fail_task(
        &self,
        id: &TaskId,
        worker: &WorkerId,
        reason: impl Into<String>,
    ) -> Result<Task, StateError> {
        let now = self.clock.now_utc();
        let reason = reason.into();
        let mut events: Vec<TrajectoryEvent> = Vec::new();
        let failed;
        {
            let mut inner = self.inner.lock();
            require_owned_running(&inner.state, id, worker)?;
            let previous = inner.state.clone();
            if let Some(task) = inner.state.tasks.get_mut(id) {
                task.status = TaskStatus::Failed;
                task.completed_at = Some(now);
                task.reason = Some(reason.clone());
            }
            events.push(
                TrajectoryEvent::new("task_failed")
                    .task(id.clone())
                    .reason(reason)
                    .with("worker_id", worker.as_str()),
            );
            events.extend(skip_dependents(&mut inner.state, id, now));
            inner.commit(previous)?;
            failed = inner.state.tasks.get(id).cloned();
        }
        for event in events {
            self.log(event);
        }
        failed.ok_or_else(|| StateError::NotFound(id.clone()))
    }

    /// Merge scalar fields into the workflow metadata bag.
    ///
    /// Rejects the reserved `tasks` key and non-scalar values; tasks are
    /// mutated only through the operations above.
    pub fn update_meta(
        &self,
        fields: BTreeMap<String, serde_json::Value>,
    ) -> Result<(), StateError> {
        let mut scalars: BTreeMap<String, MetaValue> = BTreeMap::new();
        for (key, value) in fields {
            if key == "tasks" {
                return Err(StateError::ReservedMetadataKey { key });
            }
            let scalar = MetaValue::from_json(value)
                .ok_or_else(|| StateError::NonScalarMetadata { key: key.clone() })?;
            scalars.insert(key, scalar);
        }

        let keys: Vec<String> = scalars.keys().cloned().collect();
        {
            let mut inner = self.inner.lock();
            let previous = inner.state.clone();
            inner.state.meta.extend(scalars);
            inner.commit(previous)?;
        }
        self.log(TrajectoryEvent::new("state_updated").with("keys", keys));
        Ok(())
    }

    /// Look up a single metadata value.
    pub fn meta_value(&self, key: &str) -> Option<MetaValue> {
        self.inner.lock().state.meta.get(key).cloned()
    }

    fn log(&self, event: TrajectoryEvent) {
        if let Err(e) = self.trajectory.append(event) {
            // The mutation has already committed; surface the log failure
            // on stderr only.
            warn!(error = %e, "failed to append trajectory event");
        }
    }
}

/// Fail every running task whose lease has expired and skip its dependents.
fn sweep_expired(state: &mut WorkflowState, now: DateTime<Utc>) -> Vec<TrajectoryEvent> {
    let expired: Vec<TaskId> = state
        .tasks
        .values()
        .filter(|t| {
            t.status == TaskStatus::Running
                && t.started_at.is_some_and(|started| {
                    (now - started).num_seconds() >= t.timeout_seconds as i64
                })
        })
        .map(|t| t.id.clone())
        .collect();

    let mut events = Vec::new();
    for id in expired {
        if let Some(task) = state.tasks.get_mut(&id) {
            task.status = TaskStatus::Failed;
            task.completed_at = Some(now);
            task.reason = Some("timeout".to_string());
        }
        events.push(
            TrajectoryEvent::new("task_failed")
                .task(id.clone())
                .reason("timeout"),
        );
        events.extend(skip_dependents(state, &id, now));
    }
    events
}

/// Mark every non-terminal transitive dependent of `failed_id` as skipped.
fn skip_dependents(
    state: &mut WorkflowState,
    failed_id: &TaskId,
    now: DateTime<Utc>,
) -> Vec<TrajectoryEvent> {
    let reason = format!("dependency_failed:{failed_id}");
    let mut events = Vec::new();
    for id in state.transitive_dependents(failed_id) {
        let Some(task) = state.tasks.get_mut(&id) else {
            continue;
        };
        if task.status.is_terminal() {
            continue;
        }
        task.status = TaskStatus::Skipped;
        task.claimed_by = None;
        task.completed_at = Some(now);
        task.reason = Some(reason.clone());
        events.push(
            TrajectoryEvent::new("task_skipped")
                .task(id.clone())
                .reason(reason.clone()),
        );
    }
    events
}

/// The first pending task, in insertion order, whose dependencies are all
/// completed. Failed or skipped dependencies never unblock a dependent.
fn select_claimable(state: &WorkflowState) -> Option<TaskId> {
    state
        .tasks
        .values()
        .find(|t| {
            t.status == TaskStatus::Pending
                && t.dependencies.iter().all(|dep| {
                    state
                        .tasks
                        .get(dep)
                        .is_some_and(|d| d.status == TaskStatus::Completed)
                })
        })
        .map(|t| t.id.clone())
}

fn require_owned_running(
    state: &WorkflowState,
    id: &TaskId,
    worker: &WorkerId,
) -> Result<(), StateError> {
    let task = state
        .tasks
        .get(id)
        .ok_or_else(|| StateError::NotFound(id.clone()))?;
    if task.status != TaskStatus::Running {
        return Err(StateError::InvalidTransition {
            task: id.clone(),
            message: format!("task is {}, not running", task.status),
        });
    }
    if task.claimed_by.as_ref() != Some(worker) {
        return Err(StateError::InvalidTransition {
            task: id.clone(),
            message: match &task.claimed_by {
                Some(owner) => format!("claimed by {owner}, not {worker}"),
                None => "task has no claimant".to_string(),
            },
        });
    }
    Ok(())
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
