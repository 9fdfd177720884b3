// Copyright (c) The hostest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{
    imp::{WorkerExit, WorkerProcess, WorkerSpawner},
    os,
};
use camino::Utf8PathBuf;
use debug_ignore::DebugIgnore;
use std::{
    io,
    process::{Child, Command, Stdio},
};

/// Launches workers as OS processes.
///
/// Every worker gets its own process group on Unix and its own job object on Windows, so killing a
/// worker also kills the processes it started.
#[derive(Clone, Debug, Default)]
pub struct CommandSpawner {
    inherit_output: bool,
    current_dir: Option<Utf8PathBuf>,
}

impl CommandSpawner {
    /// Creates a spawner that discards worker output.
    pub fn new() -> Self {
        Self::default()
    }

    /// If true, workers write to this process's standard output and error.
    pub fn with_inherit_output(mut self, inherit_output: bool) -> Self {
        self.inherit_output = inherit_output;
        self
    }

    /// Sets the working directory workers start in.
    pub fn with_current_dir(mut self, dir: impl Into<Utf8PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    fn output(&self) -> Stdio {
        if self.inherit_output {
            Stdio::inherit()
        } else {
            Stdio::null()
        }
    }
}

impl WorkerSpawner for CommandSpawner {
    type Worker = CommandWorker;

    fn spawn(&mut self, args: &[String]) -> io::Result<CommandWorker> {
        let (program, rest) = args
            .split_first()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "empty command line"))?;

        let mut cmd = Command::new(program);
        cmd.args(rest)
            .stdin(Stdio::null())
            .stdout(self.output())
            .stderr(self.output());
        if let Some(dir) = &self.current_dir {
            cmd.current_dir(dir);
        }
        os::set_process_group(&mut cmd);

        let mut child = cmd.spawn()?;
        let tree = match os::ProcessTree::attach(&child) {
            Ok(tree) => tree,
            Err(error) => {
                // An untracked worker can't be stopped reliably, so don't let it run.
                let _ = child.kill();
                let _ = child.wait();
                return Err(error);
            }
        };

        Ok(CommandWorker {
            child,
            tree: DebugIgnore(tree),
            exited: false,
        })
    }
}

/// A worker launched by [`CommandSpawner`].
#[derive(Debug)]
pub struct CommandWorker {
    child: Child,
    tree: DebugIgnore<os::ProcessTree>,
    exited: bool,
}

impl WorkerProcess for CommandWorker {
    fn try_wait(&mut self) -> io::Result<Option<WorkerExit>> {
        match self.child.try_wait()? {
            Some(status) => {
                self.exited = true;
                Ok(Some(WorkerExit::with_code(status.code())))
            }
            None => Ok(None),
        }
    }

    fn kill(&mut self) -> io::Result<()> {
        if self.exited {
            return Ok(());
        }
        self.tree.kill(&self.child);
        self.child.kill()?;
        self.child.wait()?;
        self.exited = true;
        Ok(())
    }

    fn id(&self) -> Option<u32> {
        (!self.exited).then(|| self.child.id())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    fn sh(script: &str) -> Vec<String> {
        vec!["sh".to_owned(), "-c".to_owned(), script.to_owned()]
    }

    fn wait_exit(worker: &mut CommandWorker) -> WorkerExit {
        let deadline = Instant::now() + Duration::from_secs(30);
        loop {
            if let Some(exit) = worker.try_wait().expect("try_wait succeeds") {
                return exit;
            }
            assert!(Instant::now() < deadline, "worker did not exit in time");
            std::thread::sleep(Duration::from_millis(10));
        }
    }

    #[test]
    fn reports_exit_code() {
        let mut spawner = CommandSpawner::new();
        let mut worker = spawner.spawn(&sh("exit 3")).expect("sh spawns");
        assert!(worker.id().is_some());
        assert_eq!(wait_exit(&mut worker), WorkerExit::with_code(Some(3)));
        assert_eq!(worker.id(), None);
        worker.kill().expect("killing an exited worker is a no-op");
    }

    #[test]
    fn kill_stops_worker_and_its_children() {
        let mut spawner = CommandSpawner::new();
        let mut worker = spawner.spawn(&sh("sleep 60 & sleep 60")).expect("sh spawns");
        worker.kill().expect("kill succeeds");
        assert_eq!(worker.id(), None);
        assert_eq!(
            worker.try_wait().expect("try_wait succeeds"),
            Some(WorkerExit::with_code(None)),
            "a killed worker has no exit code"
        );
    }

    #[test]
    fn rejects_empty_command_line() {
        let error = CommandSpawner::new()
            .spawn(&[])
            .expect_err("empty command lines are rejected");
        assert_eq!(error.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn missing_program_fails_to_spawn() {
        assert!(
            CommandSpawner::new()
                .spawn(&["hostest-this-program-does-not-exist".to_owned()])
                .is_err()
        );
    }
}
