//! Execution strategies for prepared snippet jobs.

mod pipeline;
mod pump;
mod pty;
mod relay;

use std::collections::BTreeMap;
use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tempfile::NamedTempFile;

use crate::adapter::Invocation;
use crate::error::ExecError;

pub use pipeline::PipelineExecutor;
pub use pty::PtyExecutor;

/// How snippets are handed to their interpreters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExecMode {
    /// Source on stdin, output streamed line by line.
    #[default]
    Pipeline,
    /// Source in a temporary file, interpreter attached to a pseudo-terminal.
    TempFile,
}

/// Shared flag that asks a running execution to stop.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ExecOptions {
    pub mode: ExecMode,
    /// Layered over the inherited environment.
    pub env: BTreeMap<String, String>,
    /// Adds `PYTHONUNBUFFERED=YES` to each call's environment.
    pub unbuffered: bool,
    pub timeout: Option<Duration>,
    pub cancel: Option<CancelToken>,
    /// Forward our stdin to the terminal in `TempFile` mode.
    pub interactive: bool,
    /// Interpreter program per canonical language tag.
    pub interpreters: BTreeMap<String, String>,
}

/// A snippet ready to run.
#[derive(Debug, Clone)]
pub struct Job {
    pub invocation: Invocation,
    pub source: String,
    pub env: Vec<(String, String)>,
    pub timeout: Option<Duration>,
    pub cancel: Option<CancelToken>,
    pub interactive: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    Exited,
    TimedOut,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOutcome {
    /// `None` when the process was killed by a signal.
    pub exit_code: Option<i32>,
    pub stderr_bytes: usize,
    pub termination: Termination,
}

impl ExecOutcome {
    /// The interpreter exited 0 without writing to stderr.
    pub fn success(&self) -> bool {
        self.termination == Termination::Exited
            && self.exit_code == Some(0)
            && self.stderr_bytes == 0
    }
}

pub trait Executor {
    fn execute(
        &self,
        job: &Job,
        out: &mut dyn Write,
        err: &mut dyn Write,
    ) -> Result<ExecOutcome, ExecError>;
}

/// Write the job's source to a temporary file that is removed on drop.
fn write_source(job: &Job) -> Result<NamedTempFile, ExecError> {
    let mut file = tempfile::Builder::new()
        .prefix("mdexe-")
        .suffix(job.invocation.suffix)
        .tempfile()
        .map_err(ExecError::TempFile)?;
    file.write_all(job.source.as_bytes())
        .and_then(|()| file.flush())
        .map_err(ExecError::TempFile)?;
    log::debug!("wrote {} source to {}", job.invocation.program, file.path().display());
    Ok(file)
}
