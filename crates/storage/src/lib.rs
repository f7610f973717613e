// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! harness-storage: persistence for workflow state, trajectory, and
//! worker identity

pub mod state_file;
pub mod trajectory;
pub mod worker_id;

pub use state_file::{StateFile, StateFileError};
pub use trajectory::{TrajectoryError, TrajectoryLog};
pub use worker_id::{load_or_create_worker_id, WorkerIdError};
