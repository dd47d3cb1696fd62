// Copyright (c) The grademill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The job dispatcher: the outer, process-level execution domain.
//!
//! The main structure in this module is [`JobDispatcher`].

mod imp;

#[cfg(unix)]
#[path = "unix.rs"]
mod os;

#[cfg(not(unix))]
#[path = "generic.rs"]
mod os;

pub use imp::*;
