// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Harness Daemon (harnessd)
//!
//! Per-project background process that owns the workflow state and
//! serializes worktree-mutating work. Listens on a Unix socket for
//! line-delimited JSON requests from the `harness` CLI and worker
//! processes.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

use harness_daemon::{lifecycle, Config, LifecycleError};
use tracing::{error, info};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Handle info flags before any config/lock acquisition
    if let Some(arg) = std::env::args().nth(1) {
        match arg.as_str() {
            "--version" | "-V" | "-v" => {
                println!("harnessd {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            "--help" | "-h" | "help" => {
                println!("harnessd {}", env!("CARGO_PKG_VERSION"));
                println!("Harness daemon - per-project task orchestrator");
                println!();
                println!("USAGE:");
                println!("    harnessd");
                println!();
                println!("The daemon is typically started by the `harness` CLI and should");
                println!("not be invoked directly. It serves the current project (or");
                println!("$HARNESS_WORKTREE) on a Unix socket derived from the project");
                println!("path, and exits on a `shutdown` request.");
                println!();
                println!("ENVIRONMENT:");
                println!("    HARNESS_WORKTREE           Override the project root");
                println!("    HARNESS_SOCKET             Override the socket path");
                println!("    HARNESS_CONTAINER_IMAGE    Run exec requests in this image");
                println!("    HARNESS_CONTAINER_RUNTIME  Container binary (default: docker)");
                println!();
                println!("OPTIONS:");
                println!("    -h, --help       Print help information");
                println!("    -v, --version    Print version information");
                return Ok(());
            }
            _ => {
                eprintln!("error: unexpected argument '{arg}'");
                eprintln!("Usage: harnessd [--help | --version]");
                std::process::exit(1);
            }
        }
    }

    let config = Config::load()?;

    // Rotate the log file if it has grown too large
    rotate_log_if_needed(&config.log_path);

    let _log_guard = setup_logging(&config)?;

    info!(project = %config.project_root.display(), "starting daemon");

    let daemon = match lifecycle::startup(&config) {
        Ok(daemon) => daemon,
        Err(LifecycleError::Conflict { pid }) => {
            eprintln!("harnessd is already running for this project");
            if !pid.is_empty() {
                eprintln!("  pid: {pid}");
            }
            std::process::exit(1);
        }
        Err(e) => {
            error!(error = %e, "failed to start daemon");
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    };

    // Signal readiness for a parent process waiting on startup
    println!("READY");

    daemon.run();
    Ok(())
}

/// Maximum log file size before rotation (10 MB).
const MAX_LOG_SIZE: u64 = 10 * 1024 * 1024;

/// Number of rotated log files to keep (daemon.log.1, .2, .3).
const MAX_ROTATED_LOGS: u32 = 3;

/// Rotate the daemon log file if it exceeds [`MAX_LOG_SIZE`].
///
/// Shifts `daemon.log` → `daemon.log.1` → `daemon.log.2` → `daemon.log.3`,
/// deleting the oldest. Best-effort: rotation failures are silently ignored
/// so the daemon still starts.
fn rotate_log_if_needed(log_path: &std::path::Path) {
    let size = match std::fs::metadata(log_path) {
        Ok(m) => m.len(),
        Err(_) => return,
    };

    if size < MAX_LOG_SIZE {
        return;
    }

    let log_str = log_path.display().to_string();

    // Shift older rotations: .3 is deleted, .2→.3, .1→.2
    for i in (1..MAX_ROTATED_LOGS).rev() {
        let from = format!("{log_str}.{i}");
        let to = format!("{log_str}.{}", i + 1);
        let _ = std::fs::rename(&from, &to);
    }

    // Rotate current log → .1
    let _ = std::fs::rename(log_path, format!("{log_str}.1"));
}

fn setup_logging(
    config: &Config,
) -> Result<tracing_appender::non_blocking::WorkerGuard, Box<dyn std::error::Error>> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let parent = config
        .log_path
        .parent()
        .ok_or("daemon log path has no parent directory")?;
    std::fs::create_dir_all(parent)?;

    let file_name = config
        .log_path
        .file_name()
        .ok_or("daemon log path has no file name")?;
    let file_appender = tracing_appender::rolling::never(parent, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(non_blocking))
        .init();

    Ok(guard)
}
