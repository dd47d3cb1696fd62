// Copyright (c) The grademill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Structured access to grademill machine-readable output.
//!
//! Every batch run by grademill leaves behind one summary record (by
//! convention `results.json` inside the submission directory). Downstream
//! grading and plotting tools read those records through the types in this
//! crate, so the serialized schema here is stable: field names and shapes
//! must not change incompatibly across versions.

#![warn(missing_docs)]

mod errors;
mod exit_codes;
mod summary;
mod test_id;

pub use errors::*;
pub use exit_codes::*;
pub use summary::*;
pub use test_id::*;
