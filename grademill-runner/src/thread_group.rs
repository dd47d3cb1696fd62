// Copyright (c) The grademill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cooperative group execution of blocking tasks.
//!
//! A [`ThreadGroup`] runs a fixed set of independently-specified blocking
//! tasks concurrently, each on its own thread, and stops *waiting* either
//! when all tasks have finished or when a timeout elapses, whichever comes
//! first. Cancellation is advisory only: a task whose work does not itself
//! respect the timeout keeps running in the background after
//! [`run`](ThreadGroup::run) returns. True preemption is impossible without
//! an OS-process boundary, which is why untrusted or unbounded test logic is
//! additionally isolated at the level of whole jobs (see
//! [`dispatch`](crate::dispatch)).

use std::{
    panic::{AssertUnwindSafe, catch_unwind},
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};
use tokio::sync::Notify;
use tracing::debug;

/// A task or finalizer closure run by a [`ThreadGroup`].
pub type GroupFn = Box<dyn FnOnce() + Send + 'static>;

struct GroupEntry {
    task: GroupFn,
    finalizer: Option<GroupFn>,
}

/// Why a [`ThreadGroup`] stopped waiting.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StopReason {
    /// Every task's finalizer ran to completion.
    AllFinished,
    /// The timeout elapsed first; some tasks may still be running.
    TimedOut,
}

/// A fixed set of blocking tasks run concurrently under one timeout.
///
/// Each task has an optional finalizer invoked immediately after the task
/// returns, on the same thread. No task-level panic aborts the group: tasks
/// are expected to capture their own results via their finalizer (typically
/// an aggregator write) rather than propagate errors through the controller.
#[derive(Default)]
pub struct ThreadGroup {
    entries: Vec<GroupEntry>,
}

impl ThreadGroup {
    /// Creates an empty group.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a task with an optional finalizer.
    pub fn push(&mut self, task: impl FnOnce() + Send + 'static, finalizer: Option<GroupFn>) {
        self.entries.push(GroupEntry {
            task: Box::new(task),
            finalizer,
        });
    }

    /// The number of tasks in the group.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the group has no tasks.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Runs every task on the runtime's blocking pool and waits until the
    /// group is stopped: all finalizers have run, or the timeout elapsed.
    ///
    /// Gives no guarantee that all task threads have exited at return;
    /// stragglers continue in the background. Callers that need the process
    /// to exit promptly despite stragglers should shut their runtime down in
    /// the background rather than dropping it (which would wait for the
    /// blocking pool to drain).
    pub async fn run(self, timeout: Duration) -> StopReason {
        let total = self.entries.len();
        if total == 0 {
            return StopReason::AllFinished;
        }

        let remaining = Arc::new(AtomicUsize::new(total));
        let all_done = Arc::new(Notify::new());
        debug!(tasks = total, ?timeout, "thread group running");

        for entry in self.entries {
            let remaining = Arc::clone(&remaining);
            let all_done = Arc::clone(&all_done);
            // The join handle is dropped: task threads are not joined, by
            // contract. Completion is tracked through the counter alone.
            drop(tokio::task::spawn_blocking(move || {
                if catch_unwind(AssertUnwindSafe(entry.task)).is_err() {
                    debug!("group task panicked; contained");
                }
                if let Some(finalizer) = entry.finalizer {
                    if catch_unwind(AssertUnwindSafe(finalizer)).is_err() {
                        debug!("group finalizer panicked; contained");
                    }
                }
                if remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
                    // Last task out signals the controller. A permit is
                    // stored even if the controller is not yet waiting.
                    all_done.notify_one();
                }
            }));
        }

        let reason = match tokio::time::timeout(timeout, all_done.notified()).await {
            Ok(()) => StopReason::AllFinished,
            Err(_) => StopReason::TimedOut,
        };
        debug!(
            ?reason,
            still_running = remaining.load(Ordering::Acquire),
            "thread group stopped"
        );
        reason
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        sync::Mutex,
        time::Instant,
    };

    #[tokio::test(flavor = "multi_thread")]
    async fn empty_group_finishes_immediately() {
        let group = ThreadGroup::new();
        assert_eq!(group.run(Duration::from_secs(5)).await, StopReason::AllFinished);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn finalizers_run_after_tasks() {
        let log: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));
        let mut group = ThreadGroup::new();
        for _ in 0..4 {
            let task_log = Arc::clone(&log);
            let fin_log = Arc::clone(&log);
            group.push(
                move || task_log.lock().unwrap().push("task"),
                Some(Box::new(move || fin_log.lock().unwrap().push("finalizer"))),
            );
        }
        assert_eq!(group.run(Duration::from_secs(5)).await, StopReason::AllFinished);

        let log = log.lock().unwrap();
        assert_eq!(log.len(), 8);
        assert_eq!(log.iter().filter(|s| **s == "finalizer").count(), 4);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn timeout_stops_waiting_before_stragglers_finish() {
        let mut group = ThreadGroup::new();
        group.push(|| std::thread::sleep(Duration::from_secs(5)), None);

        let started = Instant::now();
        let reason = group.run(Duration::from_millis(100)).await;
        assert_eq!(reason, StopReason::TimedOut);
        assert!(
            started.elapsed() < Duration::from_secs(2),
            "run returned promptly at the timeout"
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn panicking_task_does_not_abort_the_group() {
        let finalized = Arc::new(AtomicUsize::new(0));
        let mut group = ThreadGroup::new();

        let counter = Arc::clone(&finalized);
        group.push(
            || panic!("hostile test body"),
            Some(Box::new(move || {
                counter.fetch_add(1, Ordering::AcqRel);
            })),
        );
        let counter = Arc::clone(&finalized);
        group.push(
            || (),
            Some(Box::new(move || {
                counter.fetch_add(1, Ordering::AcqRel);
            })),
        );

        assert_eq!(group.run(Duration::from_secs(5)).await, StopReason::AllFinished);
        assert_eq!(finalized.load(Ordering::Acquire), 2);
    }
}
