// Copyright (c) The grademill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::os::unix::process::CommandExt;
use tokio::process::Child;
use tracing::debug;

/// Pre-spawn configuration on Unix.
///
/// Puts the job in its own process group so that termination reaches any
/// grandchildren the submission spawns.
pub(super) fn set_process_group(cmd: &mut std::process::Command) {
    cmd.process_group(0);
}

/// Forcibly terminates a job's process and reaps it.
///
/// SIGKILL is sent to the whole process group first: unlike the advisory
/// cancellation inside a batch, this cancellation is guaranteed effective.
/// The OS reclaims everything the job held.
pub(super) async fn terminate_child(child: &mut Child) {
    if let Some(pid) = child.id() {
        debug!(pid, "killing timed-out job process group");
        // Negative pid addresses the process group. The group may have
        // partially exited already; errors here are expected and ignored.
        unsafe {
            libc::kill(-(pid as i32), libc::SIGKILL);
        }
    }
    // Kill the direct child (a no-op if the group kill already landed) and
    // reap it so no zombie outlives the dispatcher.
    let _ = child.kill().await;
}
