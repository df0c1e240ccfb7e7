use std::io::{self, Write};
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::thread;

use super::pump::{self, Chunk};
use super::{ExecOutcome, Executor, Job, write_source};
use crate::adapter::SourceDelivery;
use crate::error::ExecError;

/// Runs the interpreter with piped stdio, feeding the source on stdin.
#[derive(Debug, Default, Clone, Copy)]
pub struct PipelineExecutor;

impl Executor for PipelineExecutor {
    fn execute(
        &self,
        job: &Job,
        out: &mut dyn Write,
        err: &mut dyn Write,
    ) -> Result<ExecOutcome, ExecError> {
        let program = &job.invocation.program;
        let mut command = Command::new(program);
        command
            .envs(job.env.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        // Held until the child has been reaped.
        let program_file = match job.invocation.delivery {
            SourceDelivery::Stdin => None,
            SourceDelivery::ProgramFile { .. } => {
                let file = write_source(job)?;
                command.args(job.invocation.file_args(file.path()));
                Some(file)
            }
        };

        log::debug!("spawning {} (pipeline)", program);
        let mut child = command.spawn().map_err(|source| ExecError::Spawn {
            program: program.clone(),
            source,
        })?;

        let stdin = child.stdin.take();
        if let Some(mut stdin) = stdin {
            if program_file.is_none() {
                let source = job.source.clone();
                thread::spawn(move || {
                    // An interpreter that exits early closes the pipe on us.
                    if let Err(e) = stdin.write_all(source.as_bytes()) {
                        if e.kind() != io::ErrorKind::BrokenPipe {
                            log::debug!("writing snippet to stdin failed: {}", e);
                        }
                    }
                });
            }
        }

        let (tx, rx) = mpsc::channel();
        if let Some(stdout) = child.stdout.take() {
            pump::read_lines(stdout, tx.clone(), Chunk::Out);
        }
        if let Some(stderr) = child.stderr.take() {
            pump::read_chunks(stderr, tx, Chunk::Err);
        }

        let outcome = pump::pump(&mut child, rx, job, out, err);
        drop(program_file);
        outcome
    }
}
