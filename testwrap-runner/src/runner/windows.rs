// Copyright (c) The testwrap Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::process::ExitStatus;
use tokio::process::Child;
use tracing::debug;

/// On Windows the child shares our console, so it has already received the same Ctrl-C or
/// Ctrl-Break event. All that's left is to wait out the grace period.
pub(super) fn interrupt_child(child: &Child) {
    debug!(pid = ?child.id(), "waiting for test binary to handle the console event");
}

pub(super) fn exit_signal(_status: ExitStatus) -> Option<i32> {
    None
}
