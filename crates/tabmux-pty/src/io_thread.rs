//! Per-process I/O threads.
//!
//! PTY reads and writes are blocking, so each child gets a dedicated reader
//! thread and a dedicated writer thread. The reader owns the `Child`: once
//! output hits EOF it reaps the child and reports the exit code, so the exit
//! event always follows the last output chunk. The writer drains a channel,
//! so a child that stops reading its input never blocks the caller.

use std::io::{ErrorKind, Read, Write};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use portable_pty::Child;

use crate::pty::{EventSink, ProcessEvent, PtyError};

const READ_BUFFER_SIZE: usize = 8192;
const REAP_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Whether a child has been reaped.
///
/// Reaping and signalling both happen under this lock, so a pid that was
/// already reaped (and may have been reused) is never signalled.
#[derive(Debug, Default)]
pub(crate) struct ReapState {
    reaped: Mutex<bool>,
}

impl ReapState {
    pub(crate) fn is_reaped(&self) -> bool {
        *self.reaped.lock()
    }

    /// Run `try_reap` under the lock. A returned exit code marks the child
    /// reaped.
    pub(crate) fn reap_with(&self, try_reap: impl FnOnce() -> Option<u32>) -> Option<u32> {
        let mut reaped = self.reaped.lock();
        if *reaped {
            return None;
        }
        let code = try_reap()?;
        *reaped = true;
        Some(code)
    }

    /// Run `signal` unless the child was already reaped.
    pub(crate) fn signal_if_live(
        &self,
        signal: impl FnOnce() -> Result<(), PtyError>,
    ) -> Result<(), PtyError> {
        let reaped = self.reaped.lock();
        if *reaped {
            return Ok(());
        }
        signal()
    }
}

/// Start the read loop for a process on a dedicated OS thread.
pub(crate) fn start_io_thread(
    pid: u32,
    reader: Box<dyn Read + Send>,
    child: Box<dyn Child + Send + Sync>,
    reap: Arc<ReapState>,
    sink: EventSink,
) -> Result<(), PtyError> {
    std::thread::Builder::new()
        .name(format!("pty-io-{pid}"))
        .spawn(move || io_loop(pid, reader, child, reap, sink))?;
    Ok(())
}

/// Start the writer thread for a process. Input sent on the returned channel
/// is written in order; the thread stops at the first write error or once
/// every sender is dropped.
pub(crate) fn start_writer_thread(
    pid: u32,
    mut writer: Box<dyn Write + Send>,
) -> Result<mpsc::Sender<Vec<u8>>, PtyError> {
    let (tx, rx) = mpsc::channel::<Vec<u8>>();
    std::thread::Builder::new()
        .name(format!("pty-write-{pid}"))
        .spawn(move || {
            for data in rx {
                if let Err(e) = writer.write_all(&data).and_then(|()| writer.flush()) {
                    log::debug!("pty {pid} write ended: {e}");
                    break;
                }
            }
        })?;
    Ok(tx)
}

fn io_loop(
    pid: u32,
    mut reader: Box<dyn Read + Send>,
    mut child: Box<dyn Child + Send + Sync>,
    reap: Arc<ReapState>,
    mut sink: EventSink,
) {
    let mut buf = [0u8; READ_BUFFER_SIZE];
    let mut decoder = Utf8Decoder::default();

    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            // Linux reports EIO once the slave side is gone.
            Err(e) => {
                log::debug!("pty {pid} read ended: {e}");
                break;
            }
        };

        let text = decoder.decode(&buf[..n]);
        if !text.is_empty() {
            sink(ProcessEvent::Output(text));
        }
    }

    let tail = decoder.finish();
    if !tail.is_empty() {
        sink(ProcessEvent::Output(tail));
    }

    let code = reap_child(pid, child.as_mut(), &reap);
    log::debug!("pty child {pid} exited with code {code}");
    sink(ProcessEvent::Exit(code));
}

/// Poll the child until it can be reaped. The child may outlive its output
/// (it closed the terminal but kept running), and stays killable meanwhile.
fn reap_child(pid: u32, child: &mut (dyn Child + Send + Sync), reap: &ReapState) -> u32 {
    loop {
        let reaped = reap.reap_with(|| match child.try_wait() {
            Ok(Some(status)) => Some(status.exit_code()),
            Ok(None) => None,
            Err(e) => {
                log::warn!("failed to reap pty child {pid}: {e}");
                Some(1)
            }
        });
        if let Some(code) = reaped {
            return code;
        }
        std::thread::sleep(REAP_POLL_INTERVAL);
    }
}

/// Incremental UTF-8 decoder that carries split code points across reads.
///
/// Invalid bytes become U+FFFD. An incomplete sequence at the end of a chunk
/// is held back until the next chunk completes it.
#[derive(Debug, Default)]
pub(crate) struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    pub(crate) fn decode(&mut self, chunk: &[u8]) -> String {
        self.pending.extend_from_slice(chunk);

        let mut out = String::with_capacity(self.pending.len());
        let mut rest: &[u8] = &self.pending;
        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    out.push_str(valid);
                    rest = &[];
                    break;
                }
                Err(err) => {
                    let (valid, after) = rest.split_at(err.valid_up_to());
                    out.push_str(&String::from_utf8_lossy(valid));
                    match err.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[len..];
                        }
                        None => {
                            rest = after;
                            break;
                        }
                    }
                }
            }
        }

        self.pending = rest.to_vec();
        out
    }

    /// Flush whatever is left, replacing an unfinished sequence.
    pub(crate) fn finish(&mut self) -> String {
        let tail = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        tail
    }
}
