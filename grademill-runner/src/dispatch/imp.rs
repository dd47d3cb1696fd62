// Copyright (c) The grademill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::os;
use crate::{
    errors::{DispatchExecuteError, JobDispatcherBuildError},
    time::{StopwatchStart, stopwatch},
};
use chrono::{DateTime, Local};
use std::{
    collections::VecDeque,
    fmt,
    process::Stdio,
    sync::{Arc, Mutex},
    time::Duration,
};
use tokio::{process::Command, runtime::Runtime};
use tracing::debug;

/// One unit of outer-level work: a command to run as an isolated process.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct JobSpec {
    program: String,
    args: Vec<String>,
}

impl JobSpec {
    /// Creates a job spec from a program and its arguments.
    pub fn new(
        program: impl Into<String>,
        args: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// The program to execute.
    pub fn program(&self) -> &str {
        &self.program
    }

    /// The program's arguments.
    pub fn args(&self) -> &[String] {
        &self.args
    }
}

impl fmt::Display for JobSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// How a job finished.
///
/// Job-level failures are statuses, not dispatcher errors: a malformed
/// submission fails its own job deterministically without affecting
/// siblings, and is never retried automatically.
#[derive(Clone, Debug)]
pub enum JobStatus {
    /// The process exited on its own. `code` is `None` if it was killed by
    /// a signal it did not expect.
    Exited {
        /// The exit code, if any.
        code: Option<i32>,
    },
    /// The process outlived its timeout and was forcibly terminated.
    TimedOut,
    /// The process could not be spawned or waited on.
    ExecFail {
        /// The underlying error.
        error: Arc<std::io::Error>,
    },
}

impl JobStatus {
    /// Returns true if the job exited with code 0.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Exited { code: Some(0) })
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exited { code: Some(code) } => write!(f, "exited with code {code}"),
            Self::Exited { code: None } => write!(f, "terminated by signal"),
            Self::TimedOut => write!(f, "timed out"),
            Self::ExecFail { error } => write!(f, "failed to execute: {error}"),
        }
    }
}

/// The completed record of one job, immutable once the worker records it.
#[derive(Clone, Debug)]
pub struct JobResult {
    /// The job's position in the submitted list.
    pub ordinal: usize,
    /// The command that was run.
    pub spec: JobSpec,
    /// How the job finished.
    pub status: JobStatus,
    /// When the job's process was launched.
    pub started_at: DateTime<Local>,
    /// Wall-clock time from launch to completion or termination.
    pub elapsed: Duration,
}

/// Progress events reported while the dispatcher runs.
#[derive(Clone, Debug)]
pub enum DispatchEvent {
    /// A job completed (in any status) and was recorded.
    JobFinished {
        /// The job's position in the submitted list.
        ordinal: usize,
        /// How the job finished.
        status: JobStatus,
        /// Jobs recorded so far, this one included.
        completed: usize,
        /// Total jobs submitted.
        total: usize,
        /// Projected time until the remaining jobs complete, recomputed
        /// after every completion from the mean job duration so far.
        projected_left: Duration,
    },
}

/// Job dispatcher options.
#[derive(Debug)]
pub struct JobDispatcherBuilder {
    pool_size: Option<usize>,
    job_timeout: Duration,
}

impl JobDispatcherBuilder {
    /// The default per-job timeout, in seconds.
    pub const DEFAULT_JOB_TIMEOUT: Duration = Duration::from_secs(600);

    /// Sets the number of worker slots. Defaults to twice the available
    /// parallelism: workers spend most of their time blocked on a child
    /// process.
    pub fn set_pool_size(&mut self, pool_size: usize) -> &mut Self {
        self.pool_size = Some(pool_size);
        self
    }

    /// Sets the hard per-job timeout.
    pub fn set_job_timeout(&mut self, job_timeout: Duration) -> &mut Self {
        self.job_timeout = job_timeout;
        self
    }

    /// Creates a new dispatcher with its own runtime.
    pub fn build(self) -> Result<JobDispatcher, JobDispatcherBuildError> {
        let pool_size = match self.pool_size {
            Some(0) => return Err(JobDispatcherBuildError::ZeroPoolSize),
            Some(size) => size,
            None => default_pool_size(),
        };
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("grademill-dispatch-worker")
            .build()
            .map_err(JobDispatcherBuildError::TokioRuntimeCreate)?;
        Ok(JobDispatcher {
            pool_size,
            job_timeout: self.job_timeout,
            runtime,
        })
    }
}

impl Default for JobDispatcherBuilder {
    fn default() -> Self {
        Self {
            pool_size: None,
            job_timeout: Self::DEFAULT_JOB_TIMEOUT,
        }
    }
}

/// The default worker pool size: 2 × available parallelism.
pub fn default_pool_size() -> usize {
    std::thread::available_parallelism().map_or(2, |cores| cores.get() * 2)
}

/// Runs a list of jobs, each as an isolated process, on a fixed pool of
/// workers with a hard per-job timeout.
///
/// Created using [`JobDispatcherBuilder::build`].
#[derive(Debug)]
pub struct JobDispatcher {
    pool_size: usize,
    job_timeout: Duration,
    runtime: Runtime,
}

impl JobDispatcher {
    /// The number of worker slots.
    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Executes the jobs and returns their results in submission order,
    /// regardless of completion order.
    ///
    /// Returns only once every worker has observed an empty queue and
    /// exited; any job still running at its timeout has been terminated for
    /// real by then. The callback receives one progress event per
    /// completion. Errors only if a worker task panicked.
    pub fn execute<F>(
        self,
        jobs: Vec<JobSpec>,
        callback: F,
    ) -> Result<Vec<JobResult>, DispatchExecuteError>
    where
        F: FnMut(DispatchEvent) + Send + 'static,
    {
        let total = jobs.len();
        let run_stopwatch = stopwatch();
        let queue: Arc<Mutex<VecDeque<(usize, JobSpec)>>> =
            Arc::new(Mutex::new(jobs.into_iter().enumerate().collect()));
        let results: Arc<Mutex<Vec<JobResult>>> = Arc::new(Mutex::new(Vec::with_capacity(total)));
        let callback = Arc::new(Mutex::new(callback));

        debug!(total, pool_size = self.pool_size, "dispatching jobs");

        let handles: Vec<_> = (0..self.pool_size)
            .map(|_| {
                self.runtime.spawn(worker_loop(
                    Arc::clone(&queue),
                    Arc::clone(&results),
                    Arc::clone(&callback),
                    self.job_timeout,
                    run_stopwatch.clone(),
                    total,
                ))
            })
            .collect();

        let join_errors = self.runtime.block_on(async {
            let mut errors = Vec::new();
            for handle in handles {
                if let Err(error) = handle.await {
                    errors.push(error);
                }
            }
            errors
        });
        if !join_errors.is_empty() {
            return Err(DispatchExecuteError { join_errors });
        }

        let mut results = Arc::try_unwrap(results)
            .expect("all workers exited, no other holders")
            .into_inner()
            .expect("results lock poisoned");
        results.sort_by_key(|result| result.ordinal);
        Ok(results)
    }
}

/// One worker: claim jobs off the shared queue until it is empty, running
/// each to completion or termination.
async fn worker_loop<F>(
    queue: Arc<Mutex<VecDeque<(usize, JobSpec)>>>,
    results: Arc<Mutex<Vec<JobResult>>>,
    callback: Arc<Mutex<F>>,
    job_timeout: Duration,
    run_stopwatch: StopwatchStart,
    total: usize,
) where
    F: FnMut(DispatchEvent) + Send,
{
    loop {
        // Pops are exclusive: exactly one worker claims each job.
        let claimed = queue.lock().expect("queue lock poisoned").pop_front();
        let Some((ordinal, spec)) = claimed else {
            break;
        };

        let job_stopwatch = stopwatch();
        let status = run_job(&spec, job_timeout).await;
        let snapshot = job_stopwatch.snapshot();
        debug!(ordinal, %spec, %status, "job finished");

        let (completed, projected_left) = {
            let mut results = results.lock().expect("results lock poisoned");
            results.push(JobResult {
                ordinal,
                spec,
                status: status.clone(),
                started_at: snapshot.start_time,
                elapsed: snapshot.duration,
            });
            let completed = results.len();
            (
                completed,
                projected_time_left(run_stopwatch.snapshot().duration, completed, total),
            )
        };

        (callback.lock().expect("callback lock poisoned"))(DispatchEvent::JobFinished {
            ordinal,
            status,
            completed,
            total,
            projected_left,
        });
    }
}

/// Launches one job and waits for it to exit or time out.
async fn run_job(spec: &JobSpec, timeout: Duration) -> JobStatus {
    let mut command = Command::new(spec.program());
    command
        .args(spec.args())
        .stdin(Stdio::null())
        // The job's console output goes to the null device; its durable
        // record is the summary file it writes itself.
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    os::set_process_group(command.as_std_mut());

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(error) => {
            return JobStatus::ExecFail {
                error: Arc::new(error),
            };
        }
    };

    tokio::select! {
        res = child.wait() => match res {
            Ok(exit_status) => JobStatus::Exited {
                code: exit_status.code(),
            },
            Err(error) => JobStatus::ExecFail {
                error: Arc::new(error),
            },
        },
        _ = tokio::time::sleep(timeout) => {
            os::terminate_child(&mut child).await;
            JobStatus::TimedOut
        }
    }
}

/// The remaining-time projection: with `completed` of `total` jobs done in
/// `elapsed`, the rest are assumed to take the mean duration so far.
pub fn projected_time_left(elapsed: Duration, completed: usize, total: usize) -> Duration {
    if completed == 0 || total <= completed {
        return Duration::ZERO;
    }
    elapsed.mul_f64((total - completed) as f64 / completed as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn dispatcher(pool_size: usize, job_timeout: Duration) -> JobDispatcher {
        let mut builder = JobDispatcherBuilder::default();
        builder
            .set_pool_size(pool_size)
            .set_job_timeout(job_timeout);
        builder.build().expect("runtime creation succeeds")
    }

    #[test]
    fn zero_pool_size_is_rejected() {
        let mut builder = JobDispatcherBuilder::default();
        builder.set_pool_size(0);
        assert!(matches!(
            builder.build(),
            Err(JobDispatcherBuildError::ZeroPoolSize)
        ));
    }

    #[test]
    fn projection_is_mean_duration_scaled() {
        // 4 of 10 jobs in 60s: 6 remaining × 15s mean = 90s.
        assert_eq!(
            projected_time_left(Duration::from_secs(60), 4, 10),
            Duration::from_secs(90)
        );
        assert_eq!(projected_time_left(Duration::from_secs(60), 0, 10), Duration::ZERO);
        assert_eq!(projected_time_left(Duration::from_secs(60), 10, 10), Duration::ZERO);
    }

    #[cfg(unix)]
    #[test]
    fn results_come_back_in_submission_order() {
        let jobs: Vec<_> = (0..10)
            .map(|i| JobSpec::new("sh", ["-c".to_owned(), format!("exit {i}")]))
            .collect();

        let results = dispatcher(3, Duration::from_secs(30))
            .execute(jobs, |_| {})
            .expect("no worker panicked");

        assert_eq!(results.len(), 10);
        for (i, result) in results.iter().enumerate() {
            assert_eq!(result.ordinal, i);
            assert!(
                matches!(result.status, JobStatus::Exited { code: Some(code) } if code == i as i32),
                "job {i} reported {}",
                result.status
            );
        }
    }

    #[cfg(unix)]
    #[test]
    fn timed_out_job_is_terminated_for_real() {
        let scratch = camino_tempfile::tempdir().expect("tempdir created");
        let marker = scratch.path().join("marker");

        // The job would create the marker after one second; the 200ms
        // timeout must kill it first.
        let jobs = vec![JobSpec::new(
            "sh",
            ["-c".to_owned(), format!("sleep 1 && echo alive > {marker}")],
        )];
        let results = dispatcher(1, Duration::from_millis(200))
            .execute(jobs, |_| {})
            .expect("no worker panicked");

        assert!(matches!(results[0].status, JobStatus::TimedOut));
        assert!(results[0].elapsed < Duration::from_secs(1));

        std::thread::sleep(Duration::from_millis(1200));
        assert!(
            !marker.exists(),
            "job process outlived its forced termination"
        );
    }

    #[cfg(unix)]
    #[test]
    fn spawn_failure_is_a_job_status() {
        let jobs = vec![
            JobSpec::new("/nonexistent/grademill-test-binary", Vec::<String>::new()),
            JobSpec::new("true", Vec::<String>::new()),
        ];
        let results = dispatcher(2, Duration::from_secs(30))
            .execute(jobs, |_| {})
            .expect("no worker panicked");

        assert!(matches!(results[0].status, JobStatus::ExecFail { .. }));
        assert!(results[1].status.is_success());
    }

    #[cfg(unix)]
    #[test]
    fn progress_events_are_emitted_per_completion() {
        let events: Arc<Mutex<Vec<DispatchEvent>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);

        let jobs: Vec<_> = (0..4).map(|_| JobSpec::new("true", Vec::<String>::new())).collect();
        dispatcher(2, Duration::from_secs(30))
            .execute(jobs, move |event| sink.lock().unwrap().push(event))
            .expect("no worker panicked");

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 4);
        for (i, event) in events.iter().enumerate() {
            let DispatchEvent::JobFinished {
                completed, total, ..
            } = event;
            assert_eq!(*completed, i + 1);
            assert_eq!(*total, 4);
        }
    }
}
