// Copyright (c) The grademill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The batch runner: the inner, thread-level execution domain.
//!
//! A [`BatchRunner`] takes a registered [`TestList`], runs every case
//! concurrently under one batch timeout via a [`ThreadGroup`], freezes the
//! [`ResultAggregator`], and produces the batch's immutable
//! [`BatchSummary`]. It is typically invoked inside a job process launched
//! by the [dispatcher](crate::dispatch).

use crate::{
    aggregator::{CaseOutcome, ResultAggregator},
    errors::BatchRunnerBuildError,
    list::{TestBody, TestCase, TestList, Verdict},
    thread_group::{GroupFn, StopReason, ThreadGroup},
};
use grademill_metadata::{BatchSummary, SummaryCounts, TestId};
use rand::{SeedableRng, rngs::StdRng};
use std::{
    any::Any,
    panic::{AssertUnwindSafe, catch_unwind},
    sync::{Arc, Mutex},
    time::Duration,
};
use tokio::runtime::Runtime;
use tracing::{debug, warn};

/// Configuration for one batch.
///
/// Explicit, per-runner state: the RNG seed and the operator feedback
/// channel are not process-wide, so multiple batches can run in the same
/// process without interfering with each other.
#[derive(Clone, Copy, Debug)]
pub struct BatchConfig {
    timeout: Duration,
    verbose: bool,
    seed: u64,
}

impl BatchConfig {
    /// The default batch timeout, in seconds.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);

    /// The default RNG seed, kept identical across runs so that randomized
    /// test inputs are consistent.
    pub const DEFAULT_SEED: u64 = 20150219;

    /// The batch-wide timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Whether per-case status lines are reported.
    pub fn verbose(&self) -> bool {
        self.verbose
    }

    /// The RNG seed for this batch.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// A deterministic RNG seeded for this batch, for harnesses that build
    /// randomized test inputs.
    pub fn rng(&self) -> StdRng {
        StdRng::seed_from_u64(self.seed)
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            timeout: Self::DEFAULT_TIMEOUT,
            verbose: false,
            seed: Self::DEFAULT_SEED,
        }
    }
}

/// Batch runner options.
#[derive(Debug, Default)]
pub struct BatchRunnerBuilder {
    config: BatchConfig,
}

impl BatchRunnerBuilder {
    /// Sets the batch-wide timeout.
    pub fn set_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.config.timeout = timeout;
        self
    }

    /// Enables or disables per-case status reporting.
    pub fn set_verbose(&mut self, verbose: bool) -> &mut Self {
        self.config.verbose = verbose;
        self
    }

    /// Sets the RNG seed for this batch.
    pub fn set_seed(&mut self, seed: u64) -> &mut Self {
        self.config.seed = seed;
        self
    }

    /// Creates a new batch runner with its own runtime.
    pub fn build(self) -> Result<BatchRunner, BatchRunnerBuildError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("grademill-batch-worker")
            .build()
            .map_err(BatchRunnerBuildError::TokioRuntimeCreate)?;
        Ok(BatchRunner {
            config: self.config,
            runtime,
        })
    }
}

/// Events reported while a batch runs, through the operator feedback
/// channel passed to [`BatchRunner::execute`].
///
/// This channel is distinct from the (possibly redirected) standard output
/// of the code under test.
#[derive(Clone, Debug)]
pub enum BatchEvent {
    /// The batch started.
    BatchStarted {
        /// The number of registered cases.
        test_count: usize,
    },
    /// One case reached its terminal status (only reported when verbose).
    ///
    /// Straggler cases that finish after the batch timeout still report
    /// here, after `BatchFinished`.
    CaseFinished {
        /// The case's identifier.
        id: TestId,
        /// An operator-facing line, e.g. `Completed with success: test_a`.
        status_line: String,
    },
    /// The batch stopped and its summary is final.
    BatchFinished {
        /// Whether the batch completed naturally or hit its timeout.
        stop_reason: StopReason,
    },
}

/// Runs one batch of registered tests under a single timeout.
///
/// Created using [`BatchRunnerBuilder::build`].
#[derive(Debug)]
pub struct BatchRunner {
    config: BatchConfig,
    runtime: Runtime,
}

impl BatchRunner {
    /// This batch's configuration.
    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Executes the listed tests, each on its own thread, and returns the
    /// batch's summary.
    ///
    /// The callback receives operator feedback events; it is shared with the
    /// test threads behind a lock, so it must be cheap. Hung cases do not
    /// block this call past the batch timeout: they are left running and
    /// reported as aborted.
    pub fn execute<F>(self, mut test_list: TestList, callback: F) -> BatchSummary
    where
        F: FnMut(BatchEvent) + Send + 'static,
    {
        let config = self.config;
        let doc_map = test_list.doc_map();
        let aggregator = Arc::new(ResultAggregator::new());
        let callback = Arc::new(Mutex::new(callback));

        emit(&callback, BatchEvent::BatchStarted {
            test_count: test_list.test_count(),
        });

        // One-time setup per distinct group, in first-seen order; teardowns
        // are held back until after the freeze.
        let mut teardowns = Vec::new();
        for group in test_list.groups_in_order() {
            if let Some(fixtures) = test_list.fixtures.remove(&group) {
                if let Some(setup) = fixtures.setup {
                    debug!(%group, "running group setup");
                    setup();
                }
                if let Some(teardown) = fixtures.teardown {
                    teardowns.push((group, teardown));
                }
            }
        }

        let mut group_runner = ThreadGroup::new();
        for case in test_list.cases {
            let TestCase {
                id,
                group: _,
                doc: _,
                expected_failure,
                body,
            } = case;

            let task_aggregator = Arc::clone(&aggregator);
            let task_id = id.clone();
            let task = move || {
                let outcome = run_case_body(body, expected_failure);
                if let Err(error) = task_aggregator.record(task_id, outcome) {
                    warn!(%error, "discarding duplicate outcome");
                }
            };

            let finalizer = config.verbose.then(|| {
                let aggregator = Arc::clone(&aggregator);
                let callback = Arc::clone(&callback);
                Box::new(move || {
                    let status_line = aggregator.status_line(&id);
                    emit(&callback, BatchEvent::CaseFinished { id, status_line });
                }) as GroupFn
            });

            group_runner.push(task, finalizer);
        }

        let stop_reason = self.runtime.block_on(group_runner.run(config.timeout));
        aggregator.freeze();

        for (group, teardown) in teardowns {
            debug!(%group, "running group teardown");
            teardown();
        }

        let summary = aggregator.summarize(&doc_map);
        emit(&callback, BatchEvent::BatchFinished { stop_reason });

        // Straggler test threads may still occupy the blocking pool; a
        // normal runtime drop would wait for them. Shut it down in the
        // background instead, leaking whatever the stragglers hold.
        self.runtime.shutdown_background();
        summary
    }
}

fn emit<F>(callback: &Arc<Mutex<F>>, event: BatchEvent)
where
    F: FnMut(BatchEvent) + Send,
{
    (callback.lock().expect("callback lock poisoned"))(event);
}

/// Runs one test body to completion, containing panics, and classifies the
/// verdict into a terminal outcome.
fn run_case_body(body: TestBody, expected_failure: bool) -> CaseOutcome {
    match catch_unwind(AssertUnwindSafe(move || body())) {
        Ok(Verdict::Pass) if expected_failure => CaseOutcome::UnexpectedSuccess,
        Ok(Verdict::Pass) => CaseOutcome::Pass,
        Ok(Verdict::Fail(detail)) if expected_failure => CaseOutcome::ExpectedFailure { detail },
        Ok(Verdict::Fail(detail)) => CaseOutcome::Failure { detail },
        Ok(Verdict::Skip(reason)) => CaseOutcome::Skip { reason },
        Err(payload) => CaseOutcome::Error {
            detail: panic_detail(payload),
        },
    }
}

fn panic_detail(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("test panicked: {message}")
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("test panicked: {message}")
    } else {
        "test panicked (non-string payload)".to_owned()
    }
}

/// The per-batch operator report line, e.g.
/// `group_17: Successful=3/5, Errors=1/5, Failed=0/5, Aborted=1/5, Skipped=0/5`.
pub fn summary_report_line(label: &str, counts: &SummaryCounts) -> String {
    let total = counts.total;
    format!(
        "{label}: Successful={}/{total}, Errors={}/{total}, Failed={}/{total}, \
         Aborted={}/{total}, Skipped={}/{total}",
        counts.successes, counts.errors, counts.failures, counts.aborted, counts.skipped,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::list::GroupFixtures;
    use grademill_metadata::TestId;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn runner(timeout: Duration, verbose: bool) -> BatchRunner {
        let mut builder = BatchRunnerBuilder::default();
        builder.set_timeout(timeout).set_verbose(verbose);
        builder.build().expect("runtime creation succeeds")
    }

    fn collect_events() -> (Arc<Mutex<Vec<BatchEvent>>>, impl FnMut(BatchEvent) + Send) {
        let events: Arc<Mutex<Vec<BatchEvent>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        (events, move |event| sink.lock().unwrap().push(event))
    }

    #[test]
    fn mixed_batch_partitions_into_expected_categories() {
        let mut list = TestList::new();
        list.add_case(TestCase::new("m.C.test_1", "C", || Verdict::Pass))
            .unwrap();
        list.add_case(TestCase::new("m.C.test_2", "C", || Verdict::Pass))
            .unwrap();
        list.add_case(TestCase::new("m.C.test_3", "C", || {
            panic!("index out of range")
        }))
        .unwrap();
        list.add_case(TestCase::new("m.C.test_4", "C", || {
            Verdict::Skip("not graded".into())
        }))
        .unwrap();
        list.add_case(
            TestCase::new("m.C.test_5", "C", || Verdict::Fail("known bug".into()))
                .expected_failure(),
        )
        .unwrap();

        let (events, callback) = collect_events();
        let summary = runner(Duration::from_secs(30), true).execute(list, callback);

        assert_eq!(
            summary.successes,
            vec![TestId::new("m.C.test_1"), TestId::new("m.C.test_2")]
        );
        assert_eq!(
            summary.errors.keys().collect::<Vec<_>>(),
            [&TestId::new("m.C.test_3")]
        );
        assert!(summary.errors[&TestId::new("m.C.test_3")].contains("index out of range"));
        assert_eq!(
            summary.skipped.keys().collect::<Vec<_>>(),
            [&TestId::new("m.C.test_4")]
        );
        assert_eq!(
            summary.expected_failures.keys().collect::<Vec<_>>(),
            [&TestId::new("m.C.test_5")]
        );
        assert!(summary.failures.is_empty());
        assert!(summary.unexpected_successes.is_empty());
        assert!(summary.aborted.is_empty());

        let events = events.lock().unwrap();
        let case_lines = events
            .iter()
            .filter(|event| matches!(event, BatchEvent::CaseFinished { .. }))
            .count();
        assert_eq!(case_lines, 5);
    }

    #[test]
    fn too_short_timeout_aborts_everything() {
        let mut list = TestList::new();
        for id in ["m.C.test_a", "m.C.test_b", "m.C.test_c"] {
            list.add_case(TestCase::new(id, "C", || {
                std::thread::sleep(Duration::from_secs(3));
                Verdict::Pass
            }))
            .unwrap();
        }

        let summary = runner(Duration::from_millis(50), false).execute(list, |_| {});

        assert_eq!(summary.aborted.len(), 3);
        assert!(summary.successes.is_empty());
        assert!(summary.failures.is_empty());
        assert!(summary.errors.is_empty());
        assert!(summary.skipped.is_empty());
        assert!(summary.expected_failures.is_empty());
        assert!(summary.unexpected_successes.is_empty());
    }

    #[test]
    fn group_fixtures_run_exactly_once_per_group() {
        let setups = Arc::new(AtomicUsize::new(0));
        let teardowns = Arc::new(AtomicUsize::new(0));

        let mut list = TestList::new();
        for (id, group) in [
            ("m.A.test_1", "A"),
            ("m.A.test_2", "A"),
            ("m.A.test_3", "A"),
            ("m.B.test_1", "B"),
        ] {
            list.add_case(TestCase::new(id, group, || Verdict::Pass))
                .unwrap();
        }
        for group in ["A", "B"] {
            let setup_count = Arc::clone(&setups);
            let teardown_count = Arc::clone(&teardowns);
            list.set_group_fixtures(
                group,
                GroupFixtures::new()
                    .on_setup(move || {
                        setup_count.fetch_add(1, Ordering::AcqRel);
                    })
                    .on_teardown(move || {
                        teardown_count.fetch_add(1, Ordering::AcqRel);
                    }),
            );
        }
        // A group with fixtures but no cases: its fixtures must not run.
        list.set_group_fixtures(
            "Empty",
            GroupFixtures::new().on_setup(|| panic!("must not run")),
        );

        let summary = runner(Duration::from_secs(30), false).execute(list, |_| {});
        assert_eq!(summary.successes.len(), 4);
        assert_eq!(setups.load(Ordering::Acquire), 2);
        assert_eq!(teardowns.load(Ordering::Acquire), 2);
    }

    #[test]
    fn expected_failure_that_passes_is_unexpected_success() {
        let mut list = TestList::new();
        list.add_case(TestCase::new("m.C.test_a", "C", || Verdict::Pass).expected_failure())
            .unwrap();

        let summary = runner(Duration::from_secs(30), false).execute(list, |_| {});
        assert_eq!(summary.unexpected_successes, vec![TestId::new("m.C.test_a")]);
    }

    #[test]
    fn config_seed_is_deterministic() {
        use rand::RngExt;

        let config = BatchConfig::default();
        assert_eq!(config.seed(), BatchConfig::DEFAULT_SEED);
        let mut first = config.rng();
        let mut second = config.rng();
        assert_eq!(first.random::<u64>(), second.random::<u64>());
    }

    #[test]
    fn report_line_format() {
        let mut list = TestList::new();
        list.add_case(
            TestCase::new("m.C.test_a", "C", || Verdict::Pass).with_doc("sorts a list"),
        )
        .unwrap();
        list.add_case(TestCase::new("m.C.test_b", "C", || {
            Verdict::Fail("wrong order".into())
        }))
        .unwrap();

        let summary = runner(Duration::from_secs(30), false).execute(list, |_| {});
        assert_eq!(
            summary_report_line("group_of_ab12_cd34", &summary.counts()),
            "group_of_ab12_cd34: Successful=1/2, Errors=0/2, Failed=1/2, \
             Aborted=0/2, Skipped=0/2"
        );
        assert_eq!(summary.all_tests[&TestId::new("m.C.test_a")], "sorts a list");
    }
}
