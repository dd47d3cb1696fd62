// Copyright (c) The grademill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Thread-safe outcome aggregation for one batch.
//!
//! Test threads report outcomes from arbitrary threads at arbitrary times,
//! including after the batch timeout has fired. Freezing the aggregator
//! decouples "what we will report" from "what stragglers still try to
//! report": writes after the freeze are silently dropped, so late threads
//! finish harmlessly without being killed and without racing the summary.

use crate::errors::RecordError;
use grademill_metadata::{BatchSummary, TestId};
use std::{collections::BTreeMap, sync::Mutex};

/// The terminal outcome of one test case.
///
/// `aborted` is deliberately absent: it is never recorded, only derived at
/// summarize time as the set of known tests with no recorded outcome.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CaseOutcome {
    /// The test passed.
    Pass,
    /// The test failed an assertion.
    Failure {
        /// Captured diagnostic text.
        detail: String,
    },
    /// The test raised outside an assertion (including panics).
    Error {
        /// Captured diagnostic text.
        detail: String,
    },
    /// The test was skipped.
    Skip {
        /// The skip reason.
        reason: String,
    },
    /// The test was expected to fail, and did.
    ExpectedFailure {
        /// Captured diagnostic text.
        detail: String,
    },
    /// The test was expected to fail, but passed.
    UnexpectedSuccess,
}

#[derive(Debug, Default)]
struct AggregatorState {
    outcomes: BTreeMap<TestId, CaseOutcome>,
    frozen: bool,
}

/// Mutable, shared-by-many-threads store of outcomes for one batch.
///
/// Owned by one [`BatchRunner`](crate::batch::BatchRunner) for the lifetime
/// of one batch. All access goes through a single lock so concurrent writers
/// cannot interleave a torn write.
#[derive(Debug, Default)]
pub struct ResultAggregator {
    state: Mutex<AggregatorState>,
}

impl ResultAggregator {
    /// Creates an empty, unfrozen aggregator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the outcome for a test.
    ///
    /// After [`freeze`](Self::freeze), this is a no-op that returns `Ok`:
    /// straggler threads must be able to report harmlessly. Before the
    /// freeze, a second record for the same test is rejected and the first
    /// one kept.
    pub fn record(&self, id: TestId, outcome: CaseOutcome) -> Result<(), RecordError> {
        let mut state = self.state.lock().expect("aggregator lock poisoned");
        if state.frozen {
            return Ok(());
        }
        if state.outcomes.contains_key(&id) {
            return Err(RecordError::Duplicate { id });
        }
        state.outcomes.insert(id, outcome);
        Ok(())
    }

    /// Makes the recorded state final. One-way: after this returns, all
    /// prior writes are visible and all future writes are inert.
    pub fn freeze(&self) {
        let mut state = self.state.lock().expect("aggregator lock poisoned");
        state.frozen = true;
    }

    /// Returns true if [`freeze`](Self::freeze) has been called.
    pub fn is_frozen(&self) -> bool {
        self.state.lock().expect("aggregator lock poisoned").frozen
    }

    /// An operator-facing status line for the given test.
    ///
    /// A test with no recorded outcome reports as "Not completed", the
    /// pre-freeze view of what becomes `aborted` in the summary.
    pub fn status_line(&self, id: &TestId) -> String {
        let state = self.state.lock().expect("aggregator lock poisoned");
        let name = id.method_name();
        match state.outcomes.get(id) {
            Some(CaseOutcome::Error { .. }) => format!("Completed with error: {name}"),
            Some(CaseOutcome::Failure { .. }) => format!("Completed with failure: {name}"),
            Some(CaseOutcome::Pass) => format!("Completed with success: {name}"),
            Some(CaseOutcome::Skip { .. }) => format!("Skipped: {name}"),
            Some(CaseOutcome::ExpectedFailure { .. }) => {
                format!("Completed with expected failure: {name}")
            }
            Some(CaseOutcome::UnexpectedSuccess) => {
                format!("Completed with unexpected success: {name}")
            }
            None => format!("Not completed: {name}"),
        }
    }

    /// Computes the immutable summary for this batch.
    ///
    /// `all_tests` is the full identifier → documentation map known at
    /// registration time; tests in it with no recorded outcome form the
    /// derived `aborted` set. Call after [`freeze`](Self::freeze).
    pub fn summarize(&self, all_tests: &BTreeMap<TestId, String>) -> BatchSummary {
        let state = self.state.lock().expect("aggregator lock poisoned");
        debug_assert!(state.frozen, "summarize called before freeze");

        let mut summary = BatchSummary {
            all_tests: all_tests.clone(),
            ..BatchSummary::default()
        };

        for id in all_tests.keys() {
            match state.outcomes.get(id) {
                Some(CaseOutcome::Pass) => summary.successes.push(id.clone()),
                Some(CaseOutcome::Failure { detail }) => {
                    summary.failures.insert(id.clone(), detail.clone());
                }
                Some(CaseOutcome::Error { detail }) => {
                    summary.errors.insert(id.clone(), detail.clone());
                }
                Some(CaseOutcome::Skip { reason }) => {
                    summary.skipped.insert(id.clone(), reason.clone());
                }
                Some(CaseOutcome::ExpectedFailure { detail }) => {
                    summary.expected_failures.insert(id.clone(), detail.clone());
                }
                Some(CaseOutcome::UnexpectedSuccess) => {
                    summary.unexpected_successes.push(id.clone());
                }
                None => summary.aborted.push(id.clone()),
            }
        }

        summary
    }
}
