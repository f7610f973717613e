// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Git gateway: serialized, screened access to `git <argv>`.
//!
//! Every invocation runs `exclusive=true`: git mutates the worktree and
//! index, so overlapping runs are never allowed. Destructive operations are
//! rejected by a configurable deny-list unless the request explicitly opts
//! in.

use crate::executor::{ExecError, ExecRequest, ExecResult, Executor};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Default timeout for git invocations.
pub const GIT_TIMEOUT: Duration = Duration::from_secs(120);

/// Errors from the git gateway.
#[derive(Debug, Error)]
pub enum GitError {
    #[error("destructive git operation rejected: {reason}")]
    Denied { reason: String },

    #[error(transparent)]
    Exec(#[from] ExecError),
}

/// A single deny-list rule.
#[derive(Debug, Clone)]
enum DenyRule {
    /// The subcommand is rejected outright
    Subcommand(&'static str),
    /// The subcommand is rejected when carrying this flag (exact or
    /// `flag=value` form)
    SubcommandFlag {
        subcommand: &'static str,
        flag: &'static str,
    },
    /// `push` with a `+refspec` force form
    ForcePushRefspec,
}

/// Deny-list of git operations known to rewrite history destructively.
#[derive(Debug, Clone)]
pub struct DenyList {
    rules: Vec<DenyRule>,
}

impl Default for DenyList {
    fn default() -> Self {
        Self {
            rules: vec![
                DenyRule::SubcommandFlag {
                    subcommand: "push",
                    flag: "--force",
                },
                DenyRule::SubcommandFlag {
                    subcommand: "push",
                    flag: "-f",
                },
                DenyRule::SubcommandFlag {
                    subcommand: "push",
                    flag: "--force-with-lease",
                },
                DenyRule::ForcePushRefspec,
                DenyRule::Subcommand("filter-branch"),
                DenyRule::Subcommand("filter-repo"),
                DenyRule::SubcommandFlag {
                    subcommand: "reset",
                    flag: "--hard",
                },
                DenyRule::SubcommandFlag {
                    subcommand: "clean",
                    flag: "-f",
                },
                DenyRule::SubcommandFlag {
                    subcommand: "clean",
                    flag: "--force",
                },
                DenyRule::SubcommandFlag {
                    subcommand: "reflog",
                    flag: "expire",
                },
                DenyRule::SubcommandFlag {
                    subcommand: "update-ref",
                    flag: "-d",
                },
            ],
        }
    }
}

impl DenyList {
    /// Screen an argv (without the leading `git`).
    pub fn check(&self, argv: &[String]) -> Result<(), GitError> {
        // The subcommand is the first argument that is not a global flag.
        let Some(subcommand) = argv.iter().find(|a| !a.starts_with('-')) else {
            return Ok(());
        };

        for rule in &self.rules {
            match rule {
                DenyRule::Subcommand(name) => {
                    if subcommand == name {
                        return Err(GitError::Denied {
                            reason: format!("git {name} rewrites history"),
                        });
                    }
                }
                DenyRule::SubcommandFlag {
                    subcommand: name,
                    flag,
                } => {
                    if subcommand == name && argv.iter().any(|a| matches_flag(a, flag)) {
                        return Err(GitError::Denied {
                            reason: format!("git {name} {flag} is destructive"),
                        });
                    }
                }
                DenyRule::ForcePushRefspec => {
                    if subcommand == "push"
                        && argv.iter().any(|a| a.starts_with('+') && a.len() > 1)
                    {
                        return Err(GitError::Denied {
                            reason: "git push with a +refspec force-updates the remote"
                                .to_string(),
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

/// `-fdx` style bundles count as carrying `-f`; `--flag=value` counts as
/// `--flag`. Bare-word rules (e.g. `reflog expire`) match exactly.
fn matches_flag(arg: &str, flag: &str) -> bool {
    if arg == flag {
        return true;
    }
    if flag.starts_with("--") {
        return arg.starts_with(&format!("{flag}="));
    }
    // Short flag: match inside a combined bundle like -fdx
    if let Some(short) = flag.strip_prefix('-') {
        return short.len() == 1 && arg.starts_with('-') && !arg.starts_with("--")
            && arg[1..].contains(short);
    }
    false
}

/// Screened, always-exclusive access to git.
pub struct GitGateway {
    executor: Arc<dyn Executor>,
    deny: DenyList,
}

impl GitGateway {
    pub fn new(executor: Arc<dyn Executor>) -> Self {
        Self {
            executor,
            deny: DenyList::default(),
        }
    }

    pub fn with_deny_list(executor: Arc<dyn Executor>, deny: DenyList) -> Self {
        Self { executor, deny }
    }

    /// Run `git <argv>` under the execution mutex.
    ///
    /// `allow_destructive` bypasses the deny-list; the result is returned
    /// verbatim from the execution runtime.
    pub fn run(
        &self,
        argv: &[String],
        cwd: Option<PathBuf>,
        allow_destructive: bool,
    ) -> Result<ExecResult, GitError> {
        if !allow_destructive {
            self.deny.check(argv)?;
        }

        let mut full = Vec::with_capacity(argv.len() + 1);
        full.push("git".to_string());
        full.extend(argv.iter().cloned());

        let mut request = ExecRequest::new(full);
        request.cwd = cwd;
        request.exclusive = true;
        request.timeout = GIT_TIMEOUT;
        Ok(self.executor.execute(&request)?)
    }
}

#[cfg(test)]
#[path = "git_tests.rs"]
mod tests;
