// Copyright (c) The grademill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::errors::{ExpectedError, Result};
use camino::{Utf8Path, Utf8PathBuf};
use clap::{Args, Parser, Subcommand};
use grademill_metadata::GrademillExitCode;
use grademill_runner::dispatch::{
    DispatchEvent, JobDispatcher, JobDispatcherBuilder, JobSpec, JobStatus,
};
use std::time::Duration;

/// A batch autograder: runs a grading program over many submissions at once.
#[derive(Debug, Parser)]
#[command(version, bin_name = "grademill")]
pub struct GrademillApp {
    #[command(subcommand)]
    command: Command,
}

impl GrademillApp {
    /// Executes the app, returning the process exit code on success.
    pub fn exec(self) -> Result<i32> {
        match self.command {
            Command::Dispatch(args) => args.exec(),
            Command::Run(args) => args.exec(),
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Grade every submission directory under a root
    ///
    /// Each immediate subdirectory of the root becomes one job:
    /// `<program> <dir> <dir>/<result-file-name> [extra args...]`, run on a
    /// fixed pool of workers with a hard per-job timeout.
    Dispatch(DispatchArgs),
    /// Run a single job under the job timeout
    ///
    /// Useful for re-grading one submission by hand. The child's exit code
    /// is propagated.
    Run(RunArgs),
}

#[derive(Debug, Args)]
struct DispatchArgs {
    /// The grading program to run once per submission directory
    program: String,

    /// The directory containing one subdirectory per submission
    submissions_root: Utf8PathBuf,

    /// Name of the result file, placed in each submission directory
    #[arg(long, value_name = "NAME", default_value = "results.json")]
    result_file_name: String,

    /// Max number of seconds a job is allowed to run
    #[arg(long, short = 't', value_name = "SECS", default_value_t = 600)]
    timeout: u64,

    /// Number of worker slots [default: 2x available parallelism]
    #[arg(long, short = 'j', value_name = "N")]
    jobs: Option<usize>,

    /// Extra arguments appended to every job command
    #[arg(last = true, value_name = "ARGS")]
    extra_args: Vec<String>,
}

impl DispatchArgs {
    fn exec(self) -> Result<i32> {
        let submission_dirs = list_submission_dirs(&self.submissions_root)?;
        println!("Found {} jobs.", submission_dirs.len());

        let jobs: Vec<_> = submission_dirs
            .iter()
            .map(|dir| {
                let mut args = vec![
                    dir.to_string(),
                    dir.join(&self.result_file_name).to_string(),
                ];
                args.extend(self.extra_args.iter().cloned());
                JobSpec::new(&self.program, args)
            })
            .collect();

        let dispatcher = build_dispatcher(self.jobs, self.timeout)?;
        let results = dispatcher.execute(jobs, report_progress)?;

        let mut failed = 0;
        let mut skipped = 0;
        for result in &results {
            match &result.status {
                JobStatus::Exited { code: Some(0) } => {}
                // Exit code 1 means a result file was already present; on a
                // re-run over a partially-graded tree that is a skip, not a
                // failure.
                JobStatus::Exited { code: Some(code) }
                    if *code == GrademillExitCode::RESULTS_EXIST =>
                {
                    skipped += 1;
                }
                status => {
                    failed += 1;
                    println!("Failed ({status}): {}", result.spec);
                }
            }
        }
        if skipped > 0 {
            println!("Skipped {skipped} jobs with existing results.");
        }

        if failed > 0 {
            Err(ExpectedError::JobRunFailed {
                failed,
                total: results.len(),
            })
        } else {
            Ok(GrademillExitCode::OK)
        }
    }
}

#[derive(Debug, Args)]
struct RunArgs {
    /// The program to run
    program: String,

    /// Arguments to pass to the program
    #[arg(value_name = "ARGS", trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,

    /// Max number of seconds the job is allowed to run
    #[arg(long, short = 't', value_name = "SECS", default_value_t = 600)]
    timeout: u64,
}

impl RunArgs {
    fn exec(self) -> Result<i32> {
        let dispatcher = build_dispatcher(Some(1), self.timeout)?;
        let results = dispatcher.execute(vec![JobSpec::new(self.program, self.args)], |_| {})?;

        let result = results
            .first()
            .expect("one job in, one result out");
        match &result.status {
            JobStatus::Exited { code: Some(code) } => Ok(*code),
            status => {
                println!("Failed ({status}): {}", result.spec);
                Err(ExpectedError::JobRunFailed {
                    failed: 1,
                    total: 1,
                })
            }
        }
    }
}

fn build_dispatcher(jobs: Option<usize>, timeout_secs: u64) -> Result<JobDispatcher> {
    let mut builder = JobDispatcherBuilder::default();
    builder.set_job_timeout(Duration::from_secs(timeout_secs));
    if let Some(jobs) = jobs {
        builder.set_pool_size(jobs);
    }
    Ok(builder.build()?)
}

/// The immediate subdirectories of the submissions root, in listing order.
fn list_submission_dirs(root: &Utf8Path) -> Result<Vec<Utf8PathBuf>> {
    let read_error = |err: std::io::Error| ExpectedError::SubmissionsRootReadError {
        path: root.to_owned(),
        err,
    };

    if !root.is_dir() {
        return Err(ExpectedError::SubmissionsRootNotADirectory {
            path: root.to_owned(),
        });
    }

    let mut dirs = Vec::new();
    for entry in root.read_dir_utf8().map_err(read_error)? {
        let entry = entry.map_err(read_error)?;
        if entry.file_type().map_err(read_error)?.is_dir() {
            dirs.push(entry.into_path());
        }
    }
    dirs.sort();
    Ok(dirs)
}

/// Prints one progress line per completed job, in the format downstream
/// course tooling greps for.
fn report_progress(event: DispatchEvent) {
    let DispatchEvent::JobFinished {
        status,
        completed,
        total,
        projected_left,
        ..
    } = event;

    if matches!(status, JobStatus::TimedOut) {
        println!("Task timed-out");
    }
    println!(
        "{completed}/{total} tasks complete. Approx time left: {:.2} min",
        projected_left.as_secs_f64() / 60.0
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use pretty_assertions::assert_eq;

    #[test]
    fn cli_args_parse() {
        GrademillApp::command().debug_assert();

        let app = GrademillApp::parse_from([
            "grademill",
            "dispatch",
            "./grade-one",
            "/work/submissions",
            "--result-file-name",
            "out.json",
            "-t",
            "120",
            "-j",
            "4",
            "--",
            "--strict",
        ]);
        let Command::Dispatch(args) = app.command else {
            panic!("expected dispatch subcommand");
        };
        assert_eq!(args.program, "./grade-one");
        assert_eq!(args.submissions_root, Utf8PathBuf::from("/work/submissions"));
        assert_eq!(args.result_file_name, "out.json");
        assert_eq!(args.timeout, 120);
        assert_eq!(args.jobs, Some(4));
        assert_eq!(args.extra_args, vec!["--strict".to_owned()]);
    }

    #[test]
    fn submission_dirs_are_sorted_and_files_ignored() {
        let root = camino_tempfile::tempdir().expect("tempdir created");
        for name in ["zeta", "alpha", "mid"] {
            std::fs::create_dir(root.path().join(name)).expect("subdir created");
        }
        std::fs::write(root.path().join("notes.txt"), "not a submission")
            .expect("file created");

        let dirs = list_submission_dirs(root.path()).expect("root is listable");
        let names: Vec<_> = dirs
            .iter()
            .map(|dir| dir.file_name().expect("has a name"))
            .collect();
        assert_eq!(names, vec!["alpha", "mid", "zeta"]);
    }

    #[test]
    fn missing_root_is_a_setup_error() {
        let err = list_submission_dirs(Utf8Path::new("/nonexistent/grademill-root"))
            .expect_err("missing root is rejected");
        assert_eq!(
            err.process_exit_code(),
            GrademillExitCode::SETUP_ERROR
        );
    }
}
