// Copyright (c) The grademill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::{error, fmt};

/// An error reading a persisted summary record.
#[derive(Debug)]
pub enum SummaryReadError {
    /// Reading the record file failed.
    Io(std::io::Error),

    /// Error parsing the JSON record.
    Json(serde_json::Error),
}

impl fmt::Display for SummaryReadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(_) => {
                write!(f, "reading summary record failed")
            }
            Self::Json(_) => {
                write!(f, "parsing summary record JSON failed")
            }
        }
    }
}

impl error::Error for SummaryReadError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Json(err) => Some(err),
        }
    }
}
