//! Streams child output to the caller while enforcing timeout and cancellation.

use std::io::{self, BufRead, BufReader, Read, Write};
use std::process::Child;
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};

use super::{ExecOutcome, Job, Termination};
use crate::error::ExecError;

const POLL: Duration = Duration::from_millis(20);

/// How long to keep draining output after the child was killed. A grandchild
/// that inherited the pipes can hold them open indefinitely.
const KILL_GRACE: Duration = Duration::from_secs(2);

pub(super) enum Chunk {
    Out(Vec<u8>),
    Err(Vec<u8>),
}

/// The part of a child process the pump needs.
pub(super) trait Process {
    fn kill(&mut self) -> io::Result<()>;

    /// Wait for exit. `None` if there is no exit code (killed by a signal).
    fn wait(&mut self) -> io::Result<Option<i32>>;

    /// `Some(exit code)` once the process has exited, without blocking.
    fn try_wait(&mut self) -> io::Result<Option<Option<i32>>>;
}

impl Process for Child {
    fn kill(&mut self) -> io::Result<()> {
        Child::kill(self)
    }

    fn wait(&mut self) -> io::Result<Option<i32>> {
        Child::wait(self).map(|status| status.code())
    }

    fn try_wait(&mut self) -> io::Result<Option<Option<i32>>> {
        Child::try_wait(self).map(|status| status.map(|s| s.code()))
    }
}

/// Kill and reap `child` when `result` is an error.
pub(super) fn reap_on_error<T>(
    child: &mut dyn Process,
    result: Result<T, ExecError>,
) -> Result<T, ExecError> {
    if result.is_err() {
        let _ = child.kill();
        let _ = child.wait();
    }
    result
}

/// Why the job should stop now, if it should.
fn stop_reason(job: &Job, deadline: Option<Instant>) -> Option<Termination> {
    if job.cancel.as_ref().is_some_and(|c| c.is_cancelled()) {
        Some(Termination::Cancelled)
    } else if deadline.is_some_and(|d| Instant::now() >= d) {
        Some(Termination::TimedOut)
    } else {
        None
    }
}

/// Forward `reader` one line at a time.
pub(super) fn read_lines<R>(reader: R, tx: Sender<Chunk>, wrap: fn(Vec<u8>) -> Chunk)
where
    R: Read + Send + 'static,
{
    thread::spawn(move || {
        let mut reader = BufReader::new(reader);
        loop {
            let mut line = Vec::new();
            match reader.read_until(b'\n', &mut line) {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    if tx.send(wrap(line)).is_err() {
                        break;
                    }
                }
            }
        }
    });
}

/// Forward `reader` in whatever pieces it yields.
///
/// A pty master reports EIO once the terminal is closed, so read errors end
/// the stream like EOF does.
pub(super) fn read_chunks<R>(mut reader: R, tx: Sender<Chunk>, wrap: fn(Vec<u8>) -> Chunk)
where
    R: Read + Send + 'static,
{
    thread::spawn(move || {
        let mut buf = [0u8; 4096];
        loop {
            match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    if tx.send(wrap(buf[..n].to_vec())).is_err() {
                        break;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(_) => break,
            }
        }
    });
}

fn kill(child: &mut dyn Process, job: &Job, reason: Termination) {
    log::debug!("killing {} ({:?})", job.invocation.program, reason);
    // The child may already be gone.
    let _ = child.kill();
}

/// Copy chunks until every reader has finished, then reap the child.
pub(super) fn pump(
    child: &mut dyn Process,
    rx: Receiver<Chunk>,
    job: &Job,
    out: &mut dyn Write,
    err: &mut dyn Write,
) -> Result<ExecOutcome, ExecError> {
    let deadline = job.timeout.map(|t| Instant::now() + t);
    let mut termination = Termination::Exited;
    let mut killed_at: Option<Instant> = None;
    let mut stderr_bytes = 0;

    loop {
        let forwarded = match rx.recv_timeout(POLL) {
            Ok(Chunk::Out(bytes)) => out.write_all(&bytes).and_then(|()| out.flush()),
            Ok(Chunk::Err(bytes)) => {
                stderr_bytes += bytes.len();
                err.write_all(&bytes).and_then(|()| err.flush())
            }
            Err(RecvTimeoutError::Timeout) => Ok(()),
            Err(RecvTimeoutError::Disconnected) => break,
        };
        if let Err(e) = forwarded {
            let _ = child.kill();
            let _ = child.wait();
            return Err(e.into());
        }

        match killed_at {
            None => {
                if let Some(reason) = stop_reason(job, deadline) {
                    termination = reason;
                    kill(child, job, reason);
                    killed_at = Some(Instant::now());
                }
            }
            Some(at) if at.elapsed() >= KILL_GRACE => {
                log::debug!("output still open {:?} after kill, detaching readers", KILL_GRACE);
                break;
            }
            Some(_) => {}
        }
    }

    // The streams can close long before the process exits, so the limits
    // still apply while waiting for it.
    let exit_code = loop {
        if killed_at.is_some() {
            break child.wait()?;
        }
        if let Some(code) = child.try_wait()? {
            break code;
        }
        if let Some(reason) = stop_reason(job, deadline) {
            termination = reason;
            kill(child, job, reason);
            killed_at = Some(Instant::now());
            continue;
        }
        thread::sleep(POLL);
    };
    log::debug!("{} finished with {:?}", job.invocation.program, exit_code);
    Ok(ExecOutcome {
        exit_code,
        stderr_bytes,
        termination,
    })
}
