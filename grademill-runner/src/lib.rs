// Copyright (c) The grademill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core batch execution logic for grademill.
//!
//! grademill runs large batches of independent, potentially-hostile or
//! hanging test workloads under strict time bounds. Execution is split
//! across two nested domains:
//!
//! * the *outer* domain ([`dispatch`]) runs each job as an isolated OS
//!   process on a fixed worker pool, with a hard per-job timeout enforced by
//!   real process termination;
//! * the *inner* domain ([`batch`], running inside one job) runs the job's
//!   test cases concurrently on its own threads under a batch-wide timeout,
//!   with cooperative cancellation only.
//!
//! Killing a process is reliable in a way that stopping a thread is not,
//! which is why the two levels exist: a test that ignores the batch timeout
//! merely becomes `aborted` in its summary, while a job that ignores its
//! timeout is terminated outright by the dispatcher.

pub mod aggregator;
pub mod batch;
pub mod dispatch;
pub mod errors;
pub mod list;
pub mod store;
pub mod thread_group;
mod time;

pub use grademill_metadata::{BatchSummary, GrademillExitCode, SummaryCounts, TestId};
