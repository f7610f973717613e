// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon lifecycle: configuration, startup, lock handling, shutdown.

use crate::handlers::HandlerCtx;
use crate::listener::Server;
use crate::registry::{Registry, RegistryError};
use fs2::FileExt;
use harness_core::{SystemClock, UuidIdGen};
use harness_runtime::{
    ContainerExecutor, Executor, GitGateway, LocalExecutor, PrefixPathMapper, StateError,
    StateManager,
};
use harness_storage::{load_or_create_worker_id, StateFile, TrajectoryLog, WorkerIdError};
use nix::sys::signal::kill;
use nix::unistd::Pid;
use std::fs::File;
use std::io::Write;
use std::os::unix::net::UnixListener;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Container mount point for the project root when the container back-end
/// is selected.
const CONTAINER_WORKSPACE: &str = "/workspace";

/// Daemon configuration: every path the daemon touches, plus the selected
/// execution back-end.
#[derive(Debug, Clone)]
pub struct Config {
    pub project_root: PathBuf,
    pub socket_path: PathBuf,
    pub pid_path: PathBuf,
    pub state_path: PathBuf,
    pub trajectory_path: PathBuf,
    pub worker_id_path: PathBuf,
    pub log_path: PathBuf,
    /// Container image for the container back-end; `None` selects local
    pub container_image: Option<String>,
    /// Container runtime binary (`docker` unless overridden)
    pub container_runtime: String,
}

impl Config {
    /// Resolve configuration for the current project.
    ///
    /// The project root is the working directory unless `HARNESS_WORKTREE`
    /// overrides it; the socket path comes from the registry hash unless
    /// `HARNESS_SOCKET` overrides it.
    pub fn load() -> Result<Self, LifecycleError> {
        let project_root = match std::env::var_os("HARNESS_WORKTREE") {
            Some(dir) => PathBuf::from(dir),
            None => std::env::current_dir()?,
        };
        let project_root = project_root.canonicalize().unwrap_or(project_root);

        let registry = Registry::new()?;
        let paths = registry.paths_for(&project_root);

        let socket_path = match std::env::var_os("HARNESS_SOCKET") {
            Some(path) => PathBuf::from(path),
            None => paths.socket_path.clone(),
        };

        Ok(Self {
            project_root,
            socket_path,
            pid_path: paths.pid_path,
            state_path: paths.state_path,
            trajectory_path: paths.trajectory_path,
            worker_id_path: paths.worker_id_path,
            log_path: paths.log_path,
            container_image: std::env::var("HARNESS_CONTAINER_IMAGE").ok(),
            container_runtime: std::env::var("HARNESS_CONTAINER_RUNTIME")
                .unwrap_or_else(|_| "docker".to_string()),
        })
    }
}

/// Lifecycle errors.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("daemon already running for this project (pid {pid})")]
    Conflict { pid: String },

    #[error("required binary `{binary}` not found on PATH")]
    CapabilityMissing { binary: String },

    #[error("failed to bind socket at {0}: {1}")]
    BindFailed(PathBuf, std::io::Error),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    WorkerId(#[from] WorkerIdError),

    #[error("trajectory error: {0}")]
    Trajectory(#[from] harness_storage::TrajectoryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A started daemon, ready to serve.
pub struct Daemon {
    pub config: Config,
    server: Server,
    // NOTE(lifetime): held to maintain the exclusive pid lock; released on drop
    #[allow(dead_code)]
    lock_file: File,
}

impl Daemon {
    /// Serve until shutdown, then remove the socket and pid files.
    pub fn run(self) {
        self.server.run();
        cleanup(&self.config);
        info!("daemon stopped");
    }
}

fn cleanup(config: &Config) {
    for path in [&config.socket_path, &config.pid_path] {
        if path.exists() {
            if let Err(e) = std::fs::remove_file(path) {
                warn!(path = %path.display(), error = %e, "failed to remove file on shutdown");
            }
        }
    }
}

/// Start the daemon: capability check, pid lock, stale-socket cleanup,
/// state load, socket bind, registry record.
pub fn startup(config: &Config) -> Result<Daemon, LifecycleError> {
    // Required binaries must be present now, not at first request.
    check_capability("git")?;
    if config.container_image.is_some() {
        check_capability(&config.container_runtime)?;
    }

    let lock_file = acquire_pid_lock(&config.pid_path)?;

    // The lock is ours and the recorded pid verified dead; any socket file
    // left behind is stale.
    if config.socket_path.exists() {
        info!(path = %config.socket_path.display(), "removing stale socket");
        std::fs::remove_file(&config.socket_path)?;
    }

    let trajectory = Arc::new(TrajectoryLog::open(&config.trajectory_path)?);
    let manager = StateManager::open(
        StateFile::new(&config.state_path),
        Arc::clone(&trajectory),
        SystemClock,
    )?;
    let worker_id = load_or_create_worker_id(&config.worker_id_path, &UuidIdGen)?;

    let executor: Arc<dyn Executor> = match &config.container_image {
        Some(image) => {
            let mapper =
                PrefixPathMapper::new(config.project_root.clone(), CONTAINER_WORKSPACE);
            Arc::new(ContainerExecutor::with_prefix(
                config.container_runtime.clone(),
                image.clone(),
                mapper,
            ))
        }
        None => Arc::new(LocalExecutor),
    };
    let git = GitGateway::new(Arc::clone(&executor));

    if let Some(parent) = config.socket_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let listener = UnixListener::bind(&config.socket_path)
        .map_err(|e| LifecycleError::BindFailed(config.socket_path.clone(), e))?;

    // Best-effort: the registry is discovery metadata, not a correctness
    // dependency.
    let registry = Registry::new()?;
    if let Err(e) = registry.register(&registry.paths_for(&config.project_root)) {
        warn!(error = %e, "failed to update project registry");
    }

    let ctx = Arc::new(HandlerCtx {
        project_root: config.project_root.clone(),
        socket_path: config.socket_path.clone(),
        manager,
        trajectory,
        executor,
        git,
        worker_id,
        shutdown: AtomicBool::new(false),
    });

    info!(socket = %config.socket_path.display(), "daemon ready");
    Ok(Daemon {
        config: config.clone(),
        server: Server::new(listener, ctx),
        lock_file,
    })
}

/// Take the single-writer pid lock, writing our pid into it.
///
/// A held flock means a live daemon owns this project: fail with
/// `Conflict` carrying the other pid. A free lock is reclaimed only after
/// verifying that the recorded pid is dead; a live recorded pid without
/// the flock (lock file replaced, or a filesystem that dropped the lock)
/// still refuses startup.
fn acquire_pid_lock(pid_path: &Path) -> Result<File, LifecycleError> {
    if let Some(parent) = pid_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .open(pid_path)?;

    if file.try_lock_exclusive().is_err() {
        let pid = recorded_pid(pid_path);
        return Err(LifecycleError::Conflict { pid });
    }

    // Lock acquired; verify the previous owner is really gone before
    // reclaiming its lock/socket pair.
    let recorded = recorded_pid(pid_path);
    if let Ok(pid) = recorded.parse::<i32>() {
        if pid != std::process::id() as i32 && pid_alive(pid) {
            return Err(LifecycleError::Conflict { pid: recorded });
        }
    }

    file.set_len(0)?;
    writeln!(file, "{}", std::process::id())?;
    file.sync_all()?;
    Ok(file)
}

fn recorded_pid(pid_path: &Path) -> String {
    std::fs::read_to_string(pid_path)
        .unwrap_or_default()
        .trim()
        .to_string()
}

/// Probe whether a pid is alive (signal 0).
pub fn pid_alive(pid: i32) -> bool {
    kill(Pid::from_raw(pid), None).is_ok()
}

/// Verify a required binary spawns at all.
fn check_capability(binary: &str) -> Result<(), LifecycleError> {
    let probe = Command::new(binary)
        .arg("--version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
    match probe {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(LifecycleError::CapabilityMissing {
                binary: binary.to_string(),
            })
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
