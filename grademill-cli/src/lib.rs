// Copyright (c) The grademill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The grademill batch autograder CLI.
//!
//! This crate holds the argument parsing and exit-code plumbing around
//! [`grademill_runner`]; it is a library only so the argument surface can be
//! tested in-crate.

mod dispatch;
mod errors;

pub use dispatch::GrademillApp;
pub use errors::ExpectedError;
