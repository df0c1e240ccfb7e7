use std::io::{self, Write};
use std::sync::mpsc;

use portable_pty::{CommandBuilder, PtySize, native_pty_system};

use super::pump::{self, Chunk, Process};
use super::relay::StdinRelay;
use super::{ExecOutcome, Executor, Job, write_source};
use crate::error::ExecError;

const TERMINAL_SIZE: PtySize = PtySize {
    rows: 24,
    cols: 80,
    pixel_width: 0,
    pixel_height: 0,
};

/// Runs the interpreter on a source file with a pseudo-terminal as its
/// controlling terminal.
///
/// The terminal merges stdout and stderr, so everything goes to `out` and
/// the outcome's `stderr_bytes` is always zero.
#[derive(Debug, Default, Clone, Copy)]
pub struct PtyExecutor;

struct PtyProcess(Box<dyn portable_pty::Child + Send + Sync>);

impl Process for PtyProcess {
    fn kill(&mut self) -> io::Result<()> {
        portable_pty::ChildKiller::kill(self.0.as_mut())
    }

    fn wait(&mut self) -> io::Result<Option<i32>> {
        let status = portable_pty::Child::wait(self.0.as_mut())?;
        Ok(Some(status.exit_code() as i32))
    }

    fn try_wait(&mut self) -> io::Result<Option<Option<i32>>> {
        let status = portable_pty::Child::try_wait(self.0.as_mut())?;
        Ok(status.map(|s| Some(s.exit_code() as i32)))
    }
}

fn pty_error(e: impl std::fmt::Display) -> ExecError {
    ExecError::Pty(e.to_string())
}

impl Executor for PtyExecutor {
    fn execute(
        &self,
        job: &Job,
        out: &mut dyn Write,
        err: &mut dyn Write,
    ) -> Result<ExecOutcome, ExecError> {
        let program = &job.invocation.program;
        let source_file = write_source(job)?;

        let pair = native_pty_system()
            .openpty(TERMINAL_SIZE)
            .map_err(pty_error)?;

        let mut command = CommandBuilder::new(program);
        command.args(job.invocation.file_args(source_file.path()));
        for (key, value) in &job.env {
            command.env(key, value);
        }
        if let Ok(dir) = std::env::current_dir() {
            command.cwd(dir);
        }

        log::debug!("spawning {} on a pty", program);
        let child = pair
            .slave
            .spawn_command(command)
            .map_err(|e| ExecError::Spawn {
                program: program.clone(),
                source: io::Error::other(e.to_string()),
            })?;
        let mut child = PtyProcess(child);
        // Only the child may hold the slave side, or the master never sees EOF.
        drop(pair.slave);

        let reader = pump::reap_on_error(
            &mut child,
            pair.master.try_clone_reader().map_err(pty_error),
        )?;
        let forwarder = if job.interactive {
            let writer = pump::reap_on_error(
                &mut child,
                pair.master.take_writer().map_err(pty_error),
            )?;
            Some(StdinRelay::global().attach(writer))
        } else {
            None
        };

        let (tx, rx) = mpsc::channel();
        pump::read_chunks(reader, tx, Chunk::Out);

        let outcome = pump::pump(&mut child, rx, job, out, err);
        drop(forwarder);
        drop(pair.master);
        drop(source_file);
        outcome
    }
}
