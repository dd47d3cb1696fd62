// Copyright (c) The grademill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persisting batch summaries as durable records.
//!
//! A summary file is the final artifact of a batch. Writes are atomic
//! (write-to-temp then rename) so a crash never leaves a half-written
//! record, and by default a path that already holds a record is skipped
//! rather than clobbered, making re-runs over a partially-graded tree
//! cheap.

use crate::errors::StoreError;
use camino::Utf8Path;
use grademill_metadata::{BatchSummary, SummaryWriteError};
use std::io::Write;
use tracing::debug;

/// Writes a summary record to `path` as pretty-printed JSON.
///
/// If `overwrite` is false and `path` already exists, nothing is written
/// and [`StoreError::ResultsExist`] is returned.
pub fn write_summary(
    path: &Utf8Path,
    summary: &BatchSummary,
    overwrite: bool,
) -> Result<(), StoreError> {
    if !overwrite && path.exists() {
        return Err(StoreError::ResultsExist {
            path: path.to_owned(),
        });
    }

    let json = summary
        .to_string_pretty()
        .map_err(|err| StoreError::Serialize(SummaryWriteError::Json(err)))?;

    atomicwrites::AtomicFile::new(path, atomicwrites::AllowOverwrite)
        .write(|file| file.write_all(json.as_bytes()))
        .map_err(|error| StoreError::Write {
            path: path.to_owned(),
            error: match error {
                atomicwrites::Error::Internal(err) | atomicwrites::Error::User(err) => err,
            },
        })?;

    debug!(%path, "wrote summary record");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use grademill_metadata::TestId;
    use pretty_assertions::assert_eq;

    fn sample_summary() -> BatchSummary {
        let mut summary = BatchSummary::default();
        summary.successes.push(TestId::new("t.C.test_a"));
        summary
            .all_tests
            .insert(TestId::new("t.C.test_a"), "does a thing".to_owned());
        summary
    }

    #[test]
    fn write_then_read_round_trips() {
        let dir = camino_tempfile::tempdir().expect("tempdir created");
        let path = dir.path().join("results.json");
        let summary = sample_summary();

        write_summary(&path, &summary, false).expect("first write succeeds");
        let read_back = BatchSummary::read_from_file(&path).expect("record parses");
        assert_eq!(read_back, summary);
    }

    #[test]
    fn existing_record_is_not_clobbered() {
        let dir = camino_tempfile::tempdir().expect("tempdir created");
        let path = dir.path().join("results.json");
        let summary = sample_summary();

        write_summary(&path, &summary, false).expect("first write succeeds");

        let mut other = sample_summary();
        other.successes.clear();
        other.aborted.push(TestId::new("t.C.test_a"));
        let err = write_summary(&path, &other, false).expect_err("second write is refused");
        assert!(matches!(err, StoreError::ResultsExist { .. }));

        // The original record is untouched.
        let read_back = BatchSummary::read_from_file(&path).expect("record parses");
        assert_eq!(read_back, summary);

        // An explicit overwrite replaces it.
        write_summary(&path, &other, true).expect("overwrite succeeds");
        let read_back = BatchSummary::read_from_file(&path).expect("record parses");
        assert_eq!(read_back, other);
    }
}
