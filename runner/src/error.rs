use std::io;

use mdexe::ResolveError;
use thiserror::Error;

/// Failure to run a snippet at all.
///
/// An interpreter that runs and fails is not an error: its exit status and
/// stderr are reported through [`ExecOutcome`](crate::ExecOutcome).
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("cannot run `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("cannot write temporary source file: {0}")]
    TempFile(#[source] io::Error),
    #[error("pseudo-terminal error: {0}")]
    Pty(String),
    #[error("snippet {0} has not been resolved")]
    Unresolved(String),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error(transparent)]
    Exec(#[from] ExecError),
}
