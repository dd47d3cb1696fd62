// Copyright (c) The grademill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use camino::Utf8PathBuf;
use grademill_metadata::GrademillExitCode;
use grademill_runner::errors::{DispatchExecuteError, JobDispatcherBuildError};
use std::error::Error;
use thiserror::Error;

pub(crate) type Result<T, E = ExpectedError> = std::result::Result<T, E>;

/// An error in a grading run that grademill knows how to report.
///
/// The `#[error()]` strings are placeholders; errors are printed with the
/// `display_to_stderr` method, which walks the source chain.
#[derive(Debug, Error)]
#[doc(hidden)]
pub enum ExpectedError {
    #[error("could not read submissions root")]
    SubmissionsRootReadError {
        path: Utf8PathBuf,
        #[source]
        err: std::io::Error,
    },
    #[error("submissions root is not a directory")]
    SubmissionsRootNotADirectory { path: Utf8PathBuf },
    #[error("building job dispatcher failed")]
    JobDispatcherBuildError {
        #[from]
        err: JobDispatcherBuildError,
    },
    #[error("dispatcher worker panicked")]
    DispatchExecuteError {
        #[from]
        err: DispatchExecuteError,
    },
    #[error("job run failed")]
    JobRunFailed { failed: usize, total: usize },
}

impl ExpectedError {
    /// Returns the exit code for the process.
    pub fn process_exit_code(&self) -> i32 {
        match self {
            Self::SubmissionsRootReadError { .. }
            | Self::SubmissionsRootNotADirectory { .. }
            | Self::JobDispatcherBuildError { .. }
            | Self::DispatchExecuteError { .. } => GrademillExitCode::SETUP_ERROR,
            Self::JobRunFailed { .. } => GrademillExitCode::JOB_RUN_FAILED,
        }
    }

    /// Displays this error to stderr.
    pub fn display_to_stderr(&self) {
        let mut next_error = match &self {
            Self::SubmissionsRootReadError { path, err } => {
                tracing::error!("could not read submissions root `{path}`");
                Some(err as &dyn Error)
            }
            Self::SubmissionsRootNotADirectory { path } => {
                tracing::error!("submissions root `{path}` is not a directory");
                None
            }
            Self::JobDispatcherBuildError { err } => {
                tracing::error!("failed to build job dispatcher");
                Some(err as &dyn Error)
            }
            Self::DispatchExecuteError { err } => {
                tracing::error!("{err}");
                err.source()
            }
            Self::JobRunFailed { failed, total } => {
                tracing::error!("{failed} of {total} jobs failed");
                None
            }
        };

        while let Some(err) = next_error {
            tracing::error!("Caused by:\n  {}", err);
            next_error = err.source();
        }
    }
}
