// Copyright (c) The grademill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Explicit test registration.
//!
//! Harnesses build a [`TestList`] up front instead of discovering tests by
//! reflection at run time: each case is registered with its identifier, its
//! group, its documentation and its body, and each group may carry one-time
//! setup/teardown fixtures. "Run setup once per class" then becomes a simple
//! grouping-and-dedupe pass over the registered cases.

use crate::errors::TestListError;
use grademill_metadata::TestId;
use smol_str::SmolStr;
use std::collections::{BTreeMap, BTreeSet};

/// What a test body reports about itself.
///
/// A panic in the body is caught at the thread boundary and recorded as an
/// error outcome; bodies never need to return one.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Verdict {
    /// The test passed.
    Pass,
    /// The test failed an assertion, with diagnostic text.
    Fail(String),
    /// The test declined to run, with a reason.
    Skip(String),
}

/// A test body: a blocking closure run on its own thread.
pub type TestBody = Box<dyn FnOnce() -> Verdict + Send + 'static>;

/// A one-time fixture closure for a test group.
pub type FixtureFn = Box<dyn FnOnce() + Send + 'static>;

/// One registered test case.
pub struct TestCase {
    pub(crate) id: TestId,
    pub(crate) group: SmolStr,
    pub(crate) doc: String,
    pub(crate) expected_failure: bool,
    pub(crate) body: TestBody,
}

impl TestCase {
    /// Creates a new test case in the given group.
    pub fn new(
        id: impl Into<TestId>,
        group: impl Into<SmolStr>,
        body: impl FnOnce() -> Verdict + Send + 'static,
    ) -> Self {
        Self {
            id: id.into(),
            group: group.into(),
            doc: String::new(),
            expected_failure: false,
            body: Box::new(body),
        }
    }

    /// Attaches a documentation string, captured into the summary's
    /// `allTests` map.
    pub fn with_doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = doc.into();
        self
    }

    /// Marks this case as expected to fail: a failing verdict becomes an
    /// expected failure, and a passing one an unexpected success.
    pub fn expected_failure(mut self) -> Self {
        self.expected_failure = true;
        self
    }

    /// Returns this case's identifier.
    pub fn id(&self) -> &TestId {
        &self.id
    }
}

impl std::fmt::Debug for TestCase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestCase")
            .field("id", &self.id)
            .field("group", &self.group)
            .field("expected_failure", &self.expected_failure)
            .finish_non_exhaustive()
    }
}

/// One-time fixtures for a test group, each run exactly once per batch
/// regardless of how many of the group's cases run.
#[derive(Default)]
pub struct GroupFixtures {
    pub(crate) setup: Option<FixtureFn>,
    pub(crate) teardown: Option<FixtureFn>,
}

impl GroupFixtures {
    /// Creates an empty fixture set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the one-time setup closure.
    pub fn on_setup(mut self, setup: impl FnOnce() + Send + 'static) -> Self {
        self.setup = Some(Box::new(setup));
        self
    }

    /// Sets the one-time teardown closure.
    pub fn on_teardown(mut self, teardown: impl FnOnce() + Send + 'static) -> Self {
        self.teardown = Some(Box::new(teardown));
        self
    }
}

/// The full set of tests for one batch, with their documentation and group
/// fixtures.
#[derive(Default)]
pub struct TestList {
    pub(crate) cases: Vec<TestCase>,
    pub(crate) fixtures: BTreeMap<SmolStr, GroupFixtures>,
    ids: BTreeSet<TestId>,
}

impl TestList {
    /// Creates an empty test list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a test case.
    ///
    /// Identifiers are unique within a batch; registering the same one twice
    /// is an error.
    pub fn add_case(&mut self, case: TestCase) -> Result<(), TestListError> {
        if !self.ids.insert(case.id.clone()) {
            return Err(TestListError::DuplicateTestId { id: case.id });
        }
        self.cases.push(case);
        Ok(())
    }

    /// Registers one-time fixtures for a group. Fixtures for a group with no
    /// registered cases never run.
    pub fn set_group_fixtures(&mut self, group: impl Into<SmolStr>, fixtures: GroupFixtures) {
        self.fixtures.insert(group.into(), fixtures);
    }

    /// The number of registered cases.
    pub fn test_count(&self) -> usize {
        self.cases.len()
    }

    /// The identifier → documentation map, captured at registration time.
    pub fn doc_map(&self) -> BTreeMap<TestId, String> {
        self.cases
            .iter()
            .map(|case| (case.id.clone(), case.doc.clone()))
            .collect()
    }

    /// Distinct groups with at least one registered case, in first-seen
    /// order.
    pub(crate) fn groups_in_order(&self) -> Vec<SmolStr> {
        let mut seen = BTreeSet::new();
        let mut groups = Vec::new();
        for case in &self.cases {
            if seen.insert(case.group.clone()) {
                groups.push(case.group.clone());
            }
        }
        groups
    }
}

impl std::fmt::Debug for TestList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestList")
            .field("cases", &self.cases)
            .field("groups", &self.fixtures.keys().collect::<Vec<_>>())
            .finish()
    }
}
