// Copyright (c) The grademill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::{borrow::Borrow, fmt};

/// An opaque identifier naming one test case.
///
/// By convention this is a dotted `module.class.method` path, but grademill
/// never parses it beyond taking the final segment for display. Identifiers
/// are stable across runs and are used as map keys everywhere.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TestId(SmolStr);

impl TestId {
    /// Creates a new identifier.
    pub fn new(id: impl Into<SmolStr>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the final dotted segment, typically the test method name.
    ///
    /// Used for operator-facing status lines; falls back to the whole
    /// identifier if there are no dots.
    pub fn method_name(&self) -> &str {
        self.0.rsplit('.').next().unwrap_or(&self.0)
    }
}

impl fmt::Display for TestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TestId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl Borrow<str> for TestId {
    fn borrow(&self) -> &str {
        self.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_name_takes_last_segment() {
        assert_eq!(TestId::new("mod.Class.test_sort").method_name(), "test_sort");
        assert_eq!(TestId::new("bare").method_name(), "bare");
    }
}
