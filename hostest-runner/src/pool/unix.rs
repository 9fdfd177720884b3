// Copyright (c) The hostest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use libc::SIGKILL;
use std::{
    io,
    os::unix::process::CommandExt,
    process::{Child, Command},
};

/// Puts the worker in a new process group whose id is the worker's pid.
pub(super) fn set_process_group(cmd: &mut Command) {
    cmd.process_group(0);
}

/// The process group of a worker.
pub(super) struct ProcessTree(());

impl ProcessTree {
    pub(super) fn attach(_child: &Child) -> io::Result<Self> {
        Ok(Self(()))
    }

    /// Sends SIGKILL to the whole process group. The child must not have been reaped yet.
    pub(super) fn kill(&self, child: &Child) {
        let Ok(pid) = libc::pid_t::try_from(child.id()) else {
            return;
        };
        // SAFETY: a negative pid addresses the process group created for this worker at spawn
        // time. Errors (such as the group already being gone) are ignored.
        unsafe {
            libc::kill(-pid, SIGKILL);
        }
    }
}
