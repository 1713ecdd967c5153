// Copyright (c) The testwrap Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use libc::SIGINT;
use std::{os::unix::process::ExitStatusExt, process::ExitStatus};
use tokio::process::Child;
use tracing::debug;

/// Asks the child to shut down by sending it SIGINT.
pub(super) fn interrupt_child(child: &Child) {
    let Some(pid) = child.id() else {
        // The child has already been reaped.
        return;
    };
    debug!(pid, "sending SIGINT to test binary");
    // SAFETY: kill is safe to call with any pid and signal number.
    unsafe {
        libc::kill(pid as i32, SIGINT);
    }
}

pub(super) fn exit_signal(status: ExitStatus) -> Option<i32> {
    status.signal()
}
