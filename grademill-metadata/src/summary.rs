// Copyright (c) The grademill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{SummaryReadError, TestId};
use camino::Utf8Path;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fs, io};

/// The durable record of one batch: every known test assigned to exactly one
/// outcome category.
///
/// Categories with diagnostic text (`errors`, `failures`, `skipped`,
/// `expectedFailures`) are maps from identifier to that text; the others are
/// lists of identifiers. `allTests` maps every identifier known at
/// registration time to its documentation string (possibly empty), and
/// `aborted` is the set of tests that never reached a terminal outcome
/// before the batch was frozen.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    /// Tests that raised outside an assertion, mapped to the captured trace.
    pub errors: BTreeMap<TestId, String>,

    /// Tests that failed an assertion, mapped to the captured trace.
    pub failures: BTreeMap<TestId, String>,

    /// Tests that passed.
    pub successes: Vec<TestId>,

    /// Tests that were skipped, mapped to the skip reason.
    pub skipped: BTreeMap<TestId, String>,

    /// Tests marked expected-to-fail that did fail, mapped to the trace.
    pub expected_failures: BTreeMap<TestId, String>,

    /// Tests marked expected-to-fail that passed anyway.
    pub unexpected_successes: Vec<TestId>,

    /// Every test known at registration time, mapped to its documentation.
    pub all_tests: BTreeMap<TestId, String>,

    /// Tests with no recorded outcome when the batch was frozen.
    pub aborted: Vec<TestId>,
}

impl BatchSummary {
    /// Reads a summary record from the given file.
    pub fn read_from_file(path: &Utf8Path) -> Result<Self, SummaryReadError> {
        let contents = fs::read(path).map_err(SummaryReadError::Io)?;
        Self::from_slice(&contents)
    }

    /// Deserializes a summary record from JSON bytes.
    pub fn from_slice(contents: &[u8]) -> Result<Self, SummaryReadError> {
        serde_json::from_slice(contents).map_err(SummaryReadError::Json)
    }

    /// Serializes this summary as pretty-printed JSON.
    pub fn to_string_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Writes this summary as pretty-printed JSON to the given writer.
    pub fn write_to(&self, writer: &mut impl io::Write) -> Result<(), SummaryWriteError> {
        serde_json::to_writer_pretty(writer, self).map_err(SummaryWriteError::Json)
    }

    /// Per-category counts for operator-facing report lines.
    pub fn counts(&self) -> SummaryCounts {
        SummaryCounts {
            total: self.all_tests.len(),
            successes: self.successes.len(),
            errors: self.errors.len(),
            failures: self.failures.len(),
            skipped: self.skipped.len(),
            expected_failures: self.expected_failures.len(),
            unexpected_successes: self.unexpected_successes.len(),
            aborted: self.aborted.len(),
        }
    }

    /// Returns the outcome category the given test landed in, if any.
    pub fn category_of(&self, id: &TestId) -> Option<SummaryCategory> {
        if self.errors.contains_key(id) {
            Some(SummaryCategory::Error)
        } else if self.failures.contains_key(id) {
            Some(SummaryCategory::Failure)
        } else if self.successes.contains(id) {
            Some(SummaryCategory::Success)
        } else if self.skipped.contains_key(id) {
            Some(SummaryCategory::Skip)
        } else if self.expected_failures.contains_key(id) {
            Some(SummaryCategory::ExpectedFailure)
        } else if self.unexpected_successes.contains(id) {
            Some(SummaryCategory::UnexpectedSuccess)
        } else if self.aborted.contains(id) {
            Some(SummaryCategory::Aborted)
        } else {
            None
        }
    }
}

/// The seven outcome categories a finished test can fall into.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SummaryCategory {
    /// Completed with success.
    Success,
    /// Failed an assertion.
    Failure,
    /// Raised outside an assertion.
    Error,
    /// Skipped.
    Skip,
    /// Expected to fail, and did.
    ExpectedFailure,
    /// Expected to fail, but passed.
    UnexpectedSuccess,
    /// Never reached a terminal outcome before the batch was frozen.
    Aborted,
}

/// Per-category counts derived from a [`BatchSummary`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SummaryCounts {
    /// Number of tests known at registration time.
    pub total: usize,
    /// Number of successes.
    pub successes: usize,
    /// Number of errors.
    pub errors: usize,
    /// Number of failures.
    pub failures: usize,
    /// Number of skipped tests.
    pub skipped: usize,
    /// Number of expected failures.
    pub expected_failures: usize,
    /// Number of unexpected successes.
    pub unexpected_successes: usize,
    /// Number of aborted tests.
    pub aborted: usize,
}

/// An error serializing a summary record.
#[derive(Debug)]
pub enum SummaryWriteError {
    /// Serializing to JSON failed.
    Json(serde_json::Error),
}

impl std::fmt::Display for SummaryWriteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Json(_) => write!(f, "serializing summary record to JSON failed"),
        }
    }
}

impl std::error::Error for SummaryWriteError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Json(err) => Some(err),
        }
    }
}
