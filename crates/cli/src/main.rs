// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `harness`: thin client for the per-project daemon.
//!
//! Argv → one JSON request → socket → stdout. No domain logic lives here;
//! the daemon owns the workflow.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod client;
mod daemon_process;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use client::Client;
use harness_daemon::Request;
use std::collections::BTreeMap;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "harness", version, about = "Client for the harness task daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Health-check the daemon
    Ping,

    /// Print the full workflow state
    State,

    /// Merge scalar metadata fields (key=value, JSON values accepted)
    Update {
        #[arg(required = true)]
        fields: Vec<String>,
    },

    /// Claim the next runnable task
    Claim {
        /// Worker identity; defaults to the project worker id
        #[arg(long)]
        worker_id: Option<String>,
    },

    /// Mark a running task completed
    Complete {
        id: String,
        #[arg(long)]
        worker_id: Option<String>,
        #[arg(long)]
        reason: Option<String>,
    },

    /// Mark a running task failed
    Fail {
        id: String,
        reason: String,
        #[arg(long)]
        worker_id: Option<String>,
    },

    /// Run a command through the daemon's execution runtime
    Exec {
        /// Run under the worktree-exclusive mutex
        #[arg(long)]
        exclusive: bool,
        #[arg(long)]
        cwd: Option<PathBuf>,
        /// Environment overlay entries (key=value)
        #[arg(long = "env", value_name = "KEY=VALUE")]
        env: Vec<String>,
        /// Timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,
        #[arg(required = true, last = true)]
        argv: Vec<String>,
    },

    /// Run git through the serialized gateway
    Git {
        #[arg(long)]
        cwd: Option<PathBuf>,
        /// Permit operations on the destructive deny-list
        #[arg(long)]
        allow_destructive: bool,
        #[arg(required = true, last = true)]
        argv: Vec<String>,
    },

    /// Plan management
    #[command(subcommand)]
    Plan(PlanCommand),

    /// Print a snapshot summary for host-tool integration
    SessionStart,

    /// Exit 0 when every task is terminal, 2 otherwise
    CheckState,

    /// Exit 0 when HEAD moved past the recorded last_commit, 2 otherwise
    CheckCommit,

    /// Print the stable per-project worker id
    WorkerId,

    /// Ask the daemon to shut down
    Shutdown,

    /// Daemon lifecycle helpers
    #[command(subcommand)]
    Daemon(DaemonCommand),
}

#[derive(Subcommand)]
enum PlanCommand {
    /// Replace the workflow with a plan file (`-` reads stdin)
    Import { file: PathBuf },
    /// Clear the workflow state
    Reset,
}

#[derive(Subcommand)]
enum DaemonCommand {
    /// Start harnessd for this project and wait for READY
    Start,
    /// Stop the project daemon
    Stop,
    /// Report whether the project daemon answers
    Status,
}

fn main() {
    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("error: {e:#}");
            std::process::exit(1);
        }
    }
}

fn run(cli: Cli) -> Result<i32> {
    let command = match cli.command {
        Command::Daemon(command) => return daemon_command(command),
        other => other,
    };

    let client = Client::for_project()?;
    let request = build_request(&client, command)?;
    let hook = matches!(request, Request::CheckState | Request::CheckCommit);

    let data = client.call_ok(&request)?;
    println!("{}", serde_json::to_string_pretty(&data)?);

    // Hook-style commands deny via exit code with the reason in the payload
    if hook && data.get("ok").and_then(|v| v.as_bool()) == Some(false) {
        return Ok(2);
    }
    Ok(0)
}

fn build_request(client: &Client, command: Command) -> Result<Request> {
    Ok(match command {
        Command::Ping => Request::Ping,
        Command::State => Request::GetState,
        Command::Update { fields } => Request::UpdateState {
            fields: parse_fields(&fields)?,
        },
        Command::Claim { worker_id } => Request::TaskClaim {
            worker_id: resolve_worker_id(client, worker_id)?,
        },
        Command::Complete {
            id,
            worker_id,
            reason,
        } => Request::TaskComplete {
            id,
            worker_id: resolve_worker_id(client, worker_id)?,
            reason,
        },
        Command::Fail {
            id,
            reason,
            worker_id,
        } => Request::TaskFail {
            id,
            worker_id: resolve_worker_id(client, worker_id)?,
            reason,
        },
        Command::Exec {
            exclusive,
            cwd,
            env,
            timeout,
            argv,
        } => Request::Exec {
            argv,
            cwd,
            env: parse_env(&env)?,
            exclusive,
            timeout,
        },
        Command::Git {
            cwd,
            allow_destructive,
            argv,
        } => Request::Git {
            argv,
            cwd,
            allow_destructive,
        },
        Command::Plan(PlanCommand::Import { file }) => {
            let contents = if file.as_os_str() == "-" {
                std::io::read_to_string(std::io::stdin())?
            } else {
                std::fs::read_to_string(&file)
                    .with_context(|| format!("cannot read plan file {}", file.display()))?
            };
            let plan = serde_json::from_str(&contents)
                .with_context(|| "plan file is not valid JSON".to_string())?;
            Request::PlanImport { plan }
        }
        Command::Plan(PlanCommand::Reset) => Request::PlanReset,
        Command::SessionStart => Request::SessionStart,
        Command::CheckState => Request::CheckState,
        Command::CheckCommit => Request::CheckCommit,
        Command::WorkerId => Request::WorkerId,
        Command::Shutdown => Request::Shutdown,
        Command::Daemon(_) => unreachable!("handled before building a request"),
    })
}

/// The caller's worker id: explicit flag, or the project's stable identity
/// fetched from the daemon.
fn resolve_worker_id(client: &Client, explicit: Option<String>) -> Result<String> {
    if let Some(id) = explicit {
        return Ok(id);
    }
    let data = client.call_ok(&Request::WorkerId)?;
    match data.get("worker_id").and_then(|v| v.as_str()) {
        Some(id) => Ok(id.to_string()),
        None => bail!("daemon returned no worker id"),
    }
}

/// Parse `key=value` pairs; values that parse as JSON scalars are passed
/// through typed, anything else as a string.
fn parse_fields(pairs: &[String]) -> Result<BTreeMap<String, serde_json::Value>> {
    let mut fields = BTreeMap::new();
    for pair in pairs {
        let Some((key, value)) = pair.split_once('=') else {
            bail!("field `{pair}` is not key=value");
        };
        let value = serde_json::from_str(value)
            .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
        fields.insert(key.to_string(), value);
    }
    Ok(fields)
}

fn parse_env(pairs: &[String]) -> Result<BTreeMap<String, String>> {
    let mut env = BTreeMap::new();
    for pair in pairs {
        let Some((key, value)) = pair.split_once('=') else {
            bail!("env entry `{pair}` is not key=value");
        };
        env.insert(key.to_string(), value.to_string());
    }
    Ok(env)
}

fn daemon_command(command: DaemonCommand) -> Result<i32> {
    match command {
        DaemonCommand::Start => {
            daemon_process::start()?;
            println!("daemon started");
            Ok(0)
        }
        DaemonCommand::Stop => {
            let client = Client::for_project()?;
            client.call_ok(&Request::Shutdown)?;
            println!("daemon stopping");
            Ok(0)
        }
        DaemonCommand::Status => {
            let client = Client::for_project()?;
            match client.call(&Request::Ping) {
                Ok(_) => {
                    println!("running");
                    Ok(0)
                }
                Err(_) => {
                    println!("not running");
                    Ok(2)
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "main_tests.rs"]
mod tests;
