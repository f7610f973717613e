// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Request handlers: pure composition over the state manager, execution
//! runtime, and git gateway.
//!
//! The dispatcher mutates nothing itself. Every consequential handler
//! appends a trajectory event after its mutation commits and before the
//! reply is written.

use crate::protocol::{ErrorKind, Request};
use harness_core::{
    PlanError, SystemClock, TaskId, TaskStatus, TrajectoryEvent, WorkerId,
};
use harness_runtime::{
    ExecError, ExecRequest, Executor, GitError, GitGateway, StateError, StateManager,
    DEFAULT_EXEC_TIMEOUT,
};
use harness_storage::TrajectoryLog;
use serde_json::json;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Daemon version reported by `ping`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Shared daemon context for all request handlers.
pub struct HandlerCtx {
    pub project_root: PathBuf,
    pub socket_path: PathBuf,
    pub manager: StateManager<SystemClock>,
    pub trajectory: Arc<TrajectoryLog>,
    pub executor: Arc<dyn Executor>,
    pub git: GitGateway,
    pub worker_id: WorkerId,
    /// Set by the shutdown handler; the listener drains and exits
    pub shutdown: AtomicBool,
}

/// Handler failures, mapped onto the wire taxonomy by [`HandlerError::kind`].
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Git(#[from] GitError),

    #[error(transparent)]
    Exec(#[from] ExecError),

    #[error("{0}")]
    Execution(String),

    #[error("{0}")]
    InvalidRequest(String),
}

impl HandlerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            HandlerError::State(StateError::NotFound(_)) => ErrorKind::NotFound,
            HandlerError::State(StateError::InvalidTransition { .. }) => {
                ErrorKind::InvalidTransition
            }
            HandlerError::State(StateError::Plan(PlanError::Cycle { .. })) => {
                ErrorKind::CycleDetected
            }
            HandlerError::State(StateError::Plan(_))
            | HandlerError::State(StateError::ReservedMetadataKey { .. })
            | HandlerError::State(StateError::NonScalarMetadata { .. }) => {
                ErrorKind::InvalidRequest
            }
            HandlerError::State(StateError::Persistence(_)) => ErrorKind::PersistenceError,
            HandlerError::Git(GitError::Denied { .. }) => ErrorKind::InvalidRequest,
            HandlerError::Git(GitError::Exec(_)) => ErrorKind::ExecutionError,
            HandlerError::Exec(_) | HandlerError::Execution(_) => ErrorKind::ExecutionError,
            HandlerError::InvalidRequest(_) => ErrorKind::InvalidRequest,
        }
    }
}

/// Dispatch a single request and produce its `data` payload.
pub fn handle_request(
    ctx: &HandlerCtx,
    request: Request,
) -> Result<serde_json::Value, HandlerError> {
    match request {
        Request::Ping => Ok(json!({ "pong": true, "version": VERSION })),

        Request::GetState => {
            let state = ctx.manager.get_state();
            Ok(serde_json::to_value(state)
                .map_err(|e| HandlerError::InvalidRequest(e.to_string()))?)
        }

        Request::UpdateState { fields } => {
            let count = fields.len();
            ctx.manager.update_meta(fields)?;
            Ok(json!({ "updated": count }))
        }

        Request::TaskClaim { worker_id } => {
            let worker = WorkerId::new(worker_id);
            let task = ctx.manager.claim_task(&worker)?;
            Ok(json!({ "task": task }))
        }

        Request::TaskComplete {
            id,
            worker_id,
            reason,
        } => {
            let task =
                ctx.manager
                    .complete_task(&TaskId::new(id), &WorkerId::new(worker_id), reason)?;
            Ok(json!({ "task": task }))
        }

        Request::TaskFail {
            id,
            worker_id,
            reason,
        } => {
            let task =
                ctx.manager
                    .fail_task(&TaskId::new(id), &WorkerId::new(worker_id), reason)?;
            Ok(json!({ "task": task }))
        }

        Request::Exec {
            argv,
            cwd,
            env,
            exclusive,
            timeout,
        } => {
            let mut exec = ExecRequest::new(argv.clone());
            exec.cwd = Some(cwd.unwrap_or_else(|| ctx.project_root.clone()));
            exec.env = env;
            exec.exclusive = exclusive;
            exec.timeout = timeout.map(Duration::from_secs).unwrap_or(DEFAULT_EXEC_TIMEOUT);

            let result = ctx.executor.execute(&exec)?;
            log_event(
                ctx,
                TrajectoryEvent::new("exec")
                    .duration_ms(result.duration_ms)
                    .with("argv", argv)
                    .with("return_code", result.return_code)
                    .with("exclusive", exclusive),
            );
            Ok(serde_json::to_value(&result)
                .map_err(|e| HandlerError::InvalidRequest(e.to_string()))?)
        }

        Request::Git {
            argv,
            cwd,
            allow_destructive,
        } => {
            let cwd = cwd.unwrap_or_else(|| ctx.project_root.clone());
            let result = ctx.git.run(&argv, Some(cwd), allow_destructive)?;
            log_event(
                ctx,
                TrajectoryEvent::new("git")
                    .duration_ms(result.duration_ms)
                    .with("argv", argv)
                    .with("return_code", result.return_code),
            );
            Ok(serde_json::to_value(&result)
                .map_err(|e| HandlerError::InvalidRequest(e.to_string()))?)
        }

        Request::PlanImport { plan } => {
            let task_count = ctx.manager.import_plan(plan)?;
            Ok(json!({ "task_count": task_count }))
        }

        Request::PlanReset => {
            ctx.manager.reset()?;
            Ok(json!({ "reset": true }))
        }

        Request::SessionStart => {
            let summary = session_summary(ctx);
            log_event(ctx, TrajectoryEvent::new("session_start"));
            Ok(summary)
        }

        Request::CheckState => {
            let state = ctx.manager.get_state();
            let incomplete: Vec<&str> = state
                .tasks
                .values()
                .filter(|t| !t.status.is_terminal())
                .map(|t| t.id.as_str())
                .collect();
            if incomplete.is_empty() {
                Ok(json!({ "ok": true }))
            } else {
                Ok(json!({
                    "ok": false,
                    "reason": "tasks_incomplete",
                    "incomplete": incomplete,
                }))
            }
        }

        Request::CheckCommit => {
            let head = current_head(ctx)?;
            let last_commit = ctx
                .manager
                .meta_value("last_commit")
                .and_then(|v| v.as_str().map(str::to_string));
            let ok = last_commit.as_deref() != Some(head.as_str());
            if ok {
                Ok(json!({ "ok": true, "head": head, "last_commit": last_commit }))
            } else {
                Ok(json!({
                    "ok": false,
                    "reason": "no_new_commit",
                    "head": head,
                    "last_commit": last_commit,
                }))
            }
        }

        Request::WorkerId => Ok(json!({ "worker_id": ctx.worker_id.as_str() })),

        Request::Shutdown => {
            ctx.shutdown.store(true, Ordering::SeqCst);
            log_event(ctx, TrajectoryEvent::new("shutdown"));
            Ok(json!({ "stopping": true }))
        }
    }
}

/// Workflow snapshot summary returned by `session_start`.
fn session_summary(ctx: &HandlerCtx) -> serde_json::Value {
    let state = ctx.manager.get_state();
    let count = |status: TaskStatus| {
        state
            .tasks
            .values()
            .filter(|t| t.status == status)
            .count()
    };
    json!({
        "worker_id": ctx.worker_id.as_str(),
        "task_count": state.tasks.len(),
        "pending": count(TaskStatus::Pending),
        "running": count(TaskStatus::Running),
        "completed": count(TaskStatus::Completed),
        "failed": count(TaskStatus::Failed),
        "skipped": count(TaskStatus::Skipped),
        "meta": state.meta,
    })
}

/// HEAD of the project worktree, read through the gateway so it serializes
/// with other git work.
fn current_head(ctx: &HandlerCtx) -> Result<String, HandlerError> {
    let argv = vec!["rev-parse".to_string(), "HEAD".to_string()];
    let result = ctx
        .git
        .run(&argv, Some(ctx.project_root.clone()), false)?;
    if result.return_code != 0 {
        return Err(HandlerError::Execution(format!(
            "git rev-parse HEAD failed: {}",
            result.stderr.trim()
        )));
    }
    Ok(result.stdout.trim().to_string())
}

/// Trajectory failures never fail a handler whose work already committed.
fn log_event(ctx: &HandlerCtx, event: TrajectoryEvent) {
    if let Err(e) = ctx.trajectory.append(event) {
        warn!(error = %e, "failed to append trajectory event");
    }
}

#[cfg(test)]
#[path = "handlers_tests.rs"]
mod tests;
