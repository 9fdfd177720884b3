// Copyright (c) The hostest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::{
    io,
    os::windows::io::AsRawHandle,
    process::{Child, Command},
};
use win32job::{ExtendedLimitInfo, Job};
use windows_sys::Win32::System::JobObjects::TerminateJobObject;

pub(super) fn set_process_group(_cmd: &mut Command) {
    // Windows tracks the process tree through the job object instead.
}

/// A job object holding the worker and every process it starts.
pub(super) struct ProcessTree {
    job: Job,
}

impl ProcessTree {
    pub(super) fn attach(child: &Child) -> io::Result<Self> {
        let job = Job::create_with_limit_info(ExtendedLimitInfo::new().limit_kill_on_job_close())
            .map_err(io::Error::other)?;
        job.assign_process(child.as_raw_handle() as isize)
            .map_err(io::Error::other)?;
        Ok(Self { job })
    }

    pub(super) fn kill(&self, _child: &Child) {
        let handle = self.job.handle();
        // SAFETY: the handle belongs to the job object owned by `self`, which stays open for the
        // duration of the call. Errors most likely mean every process in the job already exited.
        unsafe {
            _ = TerminateJobObject(handle as _, 1);
        }
    }
}
