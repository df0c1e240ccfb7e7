//! Shares the process's stdin between the interactive snippets of a run.

use std::io::{self, BufRead, BufReader, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

const POLL: Duration = Duration::from_millis(20);

/// Reads stdin on one long-lived thread and hands each line to whichever
/// snippet is attached at the time.
///
/// Nothing read is lost between snippets: input typed while no snippet is
/// running waits for the next one.
pub(super) struct StdinRelay {
    lines: Mutex<Receiver<Vec<u8>>>,
    /// A line the last writer failed to take.
    held: Mutex<Option<Vec<u8>>>,
}

impl StdinRelay {
    pub(super) fn new<R>(reader: R) -> Self
    where
        R: Read + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let mut reader = BufReader::new(reader);
            loop {
                let mut line = Vec::new();
                match reader.read_until(b'\n', &mut line) {
                    Ok(0) | Err(_) => break,
                    Ok(_) => {
                        if tx.send(line).is_err() {
                            break;
                        }
                    }
                }
            }
        });
        StdinRelay {
            lines: Mutex::new(rx),
            held: Mutex::new(None),
        }
    }

    /// The relay over this process's stdin, started on first use.
    pub(super) fn global() -> &'static Arc<StdinRelay> {
        static RELAY: OnceLock<Arc<StdinRelay>> = OnceLock::new();
        RELAY.get_or_init(|| Arc::new(StdinRelay::new(io::stdin())))
    }

    /// Forward input to `writer` until the returned guard is dropped.
    pub(super) fn attach(self: &Arc<Self>, mut writer: Box<dyn Write + Send>) -> Forwarder {
        let relay = Arc::clone(self);
        let stop = Arc::new(AtomicBool::new(false));
        let stopped = Arc::clone(&stop);
        let handle = thread::spawn(move || {
            let lines = relay.lines.lock().unwrap_or_else(PoisonError::into_inner);
            while !stopped.load(Ordering::Relaxed) {
                let held = relay
                    .held
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .take();
                let line = match held {
                    Some(line) => line,
                    None => match lines.recv_timeout(POLL) {
                        Ok(line) => line,
                        Err(RecvTimeoutError::Timeout) => continue,
                        Err(RecvTimeoutError::Disconnected) => break,
                    },
                };
                if writer.write_all(&line).and_then(|()| writer.flush()).is_err() {
                    *relay.held.lock().unwrap_or_else(PoisonError::into_inner) = Some(line);
                    break;
                }
            }
        });
        Forwarder {
            stop,
            handle: Some(handle),
        }
    }
}

/// Stops forwarding when dropped.
pub(super) struct Forwarder {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Drop for Forwarder {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::Sender;
    use std::time::Instant;

    /// Stands in for a terminal the user types into.
    struct Keyboard {
        keys: Receiver<Vec<u8>>,
        pending: Vec<u8>,
    }

    impl Read for Keyboard {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.pending.is_empty() {
                match self.keys.recv() {
                    Ok(bytes) => self.pending = bytes,
                    Err(_) => return Ok(0),
                }
            }
            let n = buf.len().min(self.pending.len());
            buf[..n].copy_from_slice(&self.pending[..n]);
            self.pending.drain(..n);
            Ok(n)
        }
    }

    #[derive(Clone, Default)]
    struct Screen(Arc<Mutex<Vec<u8>>>);

    impl Screen {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl Write for Screen {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// A writer whose far end has gone away.
    struct Closed;

    impl Write for Closed {
        fn write(&mut self, _: &[u8]) -> io::Result<usize> {
            Err(io::ErrorKind::BrokenPipe.into())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn keyboard() -> (Sender<Vec<u8>>, Arc<StdinRelay>) {
        let (tx, keys) = mpsc::channel();
        let relay = StdinRelay::new(Keyboard {
            keys,
            pending: Vec::new(),
        });
        (tx, Arc::new(relay))
    }

    fn wait_for(screen: &Screen, text: &str) {
        let start = Instant::now();
        while !screen.contents().contains(text) {
            assert!(start.elapsed() < Duration::from_secs(5), "never saw {text:?}");
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn input_goes_to_the_attached_snippet_only() {
        let (keys, relay) = keyboard();
        let first = Screen::default();
        let second = Screen::default();

        keys.send(b"one\n".to_vec()).unwrap();
        let forwarder = relay.attach(Box::new(first.clone()));
        wait_for(&first, "one\n");
        drop(forwarder);

        keys.send(b"two\n".to_vec()).unwrap();
        let forwarder = relay.attach(Box::new(second.clone()));
        wait_for(&second, "two\n");
        drop(forwarder);

        assert_eq!(first.contents(), "one\n");
        assert_eq!(second.contents(), "two\n");
    }

    #[test]
    fn input_typed_between_snippets_waits() {
        let (keys, relay) = keyboard();
        keys.send(b"early\n".to_vec()).unwrap();
        thread::sleep(Duration::from_millis(50));

        let screen = Screen::default();
        let forwarder = relay.attach(Box::new(screen.clone()));
        wait_for(&screen, "early\n");
        drop(forwarder);
    }

    #[test]
    fn line_refused_by_a_closed_terminal_is_kept() {
        let (keys, relay) = keyboard();
        keys.send(b"kept\n".to_vec()).unwrap();
        let forwarder = relay.attach(Box::new(Closed));
        let start = Instant::now();
        while relay.held.lock().unwrap().is_none() {
            assert!(start.elapsed() < Duration::from_secs(5));
            thread::sleep(Duration::from_millis(5));
        }
        drop(forwarder);

        let screen = Screen::default();
        let forwarder = relay.attach(Box::new(screen.clone()));
        wait_for(&screen, "kept\n");
        drop(forwarder);
    }
}
