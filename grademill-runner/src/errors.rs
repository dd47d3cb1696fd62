// Copyright (c) The grademill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced by grademill-runner.

use camino::Utf8PathBuf;
use grademill_metadata::{SummaryWriteError, TestId};
use thiserror::Error;
use tokio::task::JoinError;

/// An error that occurs while recording an outcome into a
/// [`ResultAggregator`](crate::aggregator::ResultAggregator).
#[derive(Debug, Error)]
pub enum RecordError {
    /// An outcome was already recorded for this test.
    ///
    /// A test belongs to exactly one category; a second record before the
    /// freeze is a harness defect, not a display-time tiebreak. The first
    /// record is left in place.
    #[error("an outcome was already recorded for test `{id}`")]
    Duplicate {
        /// The test that was recorded twice.
        id: TestId,
    },
}

/// An error that occurs while registering tests into a
/// [`TestList`](crate::list::TestList).
#[derive(Debug, Error)]
pub enum TestListError {
    /// A test with this identifier was already registered.
    #[error("a test with identifier `{id}` was already registered")]
    DuplicateTestId {
        /// The duplicated identifier.
        id: TestId,
    },
}

/// An error building a [`BatchRunner`](crate::batch::BatchRunner).
#[derive(Debug, Error)]
pub enum BatchRunnerBuildError {
    /// An error occurred while creating the Tokio runtime.
    #[error("error creating Tokio runtime")]
    TokioRuntimeCreate(#[source] std::io::Error),
}

/// An error building a [`JobDispatcher`](crate::dispatch::JobDispatcher).
#[derive(Debug, Error)]
pub enum JobDispatcherBuildError {
    /// An error occurred while creating the Tokio runtime.
    #[error("error creating Tokio runtime")]
    TokioRuntimeCreate(#[source] std::io::Error),

    /// The worker pool size was zero.
    #[error("worker pool size must be non-zero")]
    ZeroPoolSize,
}

/// An error returned by
/// [`JobDispatcher::execute`](crate::dispatch::JobDispatcher::execute) when
/// one or more worker tasks panicked.
///
/// Job-level failures (non-zero exits, timeouts, spawn failures) are not
/// errors; they are recorded as job statuses.
#[derive(Debug, Error)]
#[error("{} dispatcher worker task(s) panicked", join_errors.len())]
pub struct DispatchExecuteError {
    /// The join errors for the panicked worker tasks.
    pub join_errors: Vec<JoinError>,
}

/// An error that occurs while persisting or skipping a summary record.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A result file already exists and overwriting was not requested.
    ///
    /// This makes batch re-runs idempotent by default; callers surface it as
    /// [`GrademillExitCode::RESULTS_EXIST`](grademill_metadata::GrademillExitCode::RESULTS_EXIST).
    #[error("results already exist at `{path}`")]
    ResultsExist {
        /// The path to the existing record.
        path: Utf8PathBuf,
    },

    /// Serializing the summary failed.
    #[error("error serializing summary record")]
    Serialize(#[source] SummaryWriteError),

    /// Writing the record file failed.
    #[error("error writing summary record to `{path}`")]
    Write {
        /// The path being written.
        path: Utf8PathBuf,
        /// The underlying error.
        #[source]
        error: std::io::Error,
    },
}
