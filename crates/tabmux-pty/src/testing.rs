//! In-memory test doubles for the spawner and delivery targets.
//!
//! [`FakeSpawner`] hands out processes whose events are driven by the test
//! through [`FakeProcessHandle`]. [`RecordingTarget`] records every event it
//! is asked to deliver.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::pty::{EventSink, Process, ProcessEvent, PtyError, SpawnCommand, Spawner};
use crate::target::{DeliveryError, DeliveryTarget, SessionEvent};

const FIRST_FAKE_PID: u32 = 10_000;

#[derive(Default)]
struct SpawnerState {
    spawned: Vec<FakeProcessHandle>,
    fail_next: Option<String>,
}

/// A spawner that never touches the OS.
#[derive(Clone, Default)]
pub struct FakeSpawner {
    state: Arc<Mutex<SpawnerState>>,
    ignore_terminate: Arc<AtomicBool>,
}

impl FakeSpawner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Processes spawned from now on survive `terminate` and only die on `kill`.
    pub fn ignore_terminate(&self, ignore: bool) {
        self.ignore_terminate.store(ignore, Ordering::SeqCst);
    }

    /// Make the next spawn fail with `message`.
    pub fn fail_next_spawn(&self, message: &str) {
        self.state.lock().fail_next = Some(message.to_string());
    }

    /// Every process spawned so far, oldest first.
    pub fn spawned(&self) -> Vec<FakeProcessHandle> {
        self.state.lock().spawned.clone()
    }

    pub fn spawn_count(&self) -> usize {
        self.state.lock().spawned.len()
    }

    pub fn last(&self) -> Option<FakeProcessHandle> {
        self.state.lock().spawned.last().cloned()
    }
}

impl Spawner for FakeSpawner {
    fn spawn(&self, command: &SpawnCommand) -> Result<Box<dyn Process>, PtyError> {
        let mut state = self.state.lock();
        if let Some(message) = state.fail_next.take() {
            return Err(PtyError::SpawnFailed(message));
        }
        let pid = FIRST_FAKE_PID + state.spawned.len() as u32;
        let inner = Arc::new(FakeInner {
            pid,
            command: command.clone(),
            ignore_terminate: self.ignore_terminate.load(Ordering::SeqCst),
            sink: Mutex::new(None),
            written: Mutex::new(Vec::new()),
            resizes: Mutex::new(Vec::new()),
            terminated: AtomicBool::new(false),
            killed: AtomicBool::new(false),
            exited: AtomicBool::new(false),
            fail_io: AtomicBool::new(false),
        });
        state.spawned.push(FakeProcessHandle {
            inner: Arc::clone(&inner),
        });
        Ok(Box::new(FakeProcess { inner }))
    }
}

struct FakeInner {
    pid: u32,
    command: SpawnCommand,
    ignore_terminate: bool,
    sink: Mutex<Option<EventSink>>,
    written: Mutex<Vec<u8>>,
    resizes: Mutex<Vec<(u16, u16)>>,
    terminated: AtomicBool,
    killed: AtomicBool,
    exited: AtomicBool,
    fail_io: AtomicBool,
}

struct FakeProcess {
    inner: Arc<FakeInner>,
}

impl Process for FakeProcess {
    fn pid(&self) -> u32 {
        self.inner.pid
    }

    fn attach(&mut self, sink: EventSink) -> Result<(), PtyError> {
        let mut slot = self.inner.sink.lock();
        if slot.is_some() {
            return Err(PtyError::AlreadyAttached);
        }
        *slot = Some(sink);
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> Result<(), PtyError> {
        if self.inner.fail_io.load(Ordering::SeqCst) {
            return Err(PtyError::Io(std::io::Error::from(
                std::io::ErrorKind::BrokenPipe,
            )));
        }
        if self.has_exited() {
            return Ok(());
        }
        self.inner.written.lock().extend_from_slice(data);
        Ok(())
    }

    fn resize(&mut self, cols: u16, rows: u16) -> Result<(), PtyError> {
        if self.inner.fail_io.load(Ordering::SeqCst) {
            return Err(PtyError::ResizeFailed("injected failure".to_string()));
        }
        if self.has_exited() {
            return Ok(());
        }
        self.inner.resizes.lock().push((cols, rows));
        Ok(())
    }

    fn terminate(&mut self) -> Result<(), PtyError> {
        self.inner.terminated.store(true, Ordering::SeqCst);
        if !self.inner.ignore_terminate {
            self.inner.exited.store(true, Ordering::SeqCst);
        }
        Ok(())
    }

    fn kill(&mut self) -> Result<(), PtyError> {
        self.inner.killed.store(true, Ordering::SeqCst);
        self.inner.exited.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn has_exited(&self) -> bool {
        self.inner.exited.load(Ordering::SeqCst)
    }
}

/// Test-side control of a fake process.
#[derive(Clone)]
pub struct FakeProcessHandle {
    inner: Arc<FakeInner>,
}

impl FakeProcessHandle {
    pub fn pid(&self) -> u32 {
        self.inner.pid
    }

    pub fn command(&self) -> &SpawnCommand {
        &self.inner.command
    }

    pub fn is_attached(&self) -> bool {
        self.inner.sink.lock().is_some()
    }

    /// Push an output chunk through the attached sink, as the I/O thread
    /// would. Returns `false` when nothing is attached.
    pub fn emit_output(&self, data: &str) -> bool {
        self.emit(ProcessEvent::Output(data.to_string()))
    }

    /// Report process exit through the attached sink.
    pub fn exit(&self, code: u32) -> bool {
        self.inner.exited.store(true, Ordering::SeqCst);
        self.emit(ProcessEvent::Exit(code))
    }

    fn emit(&self, event: ProcessEvent) -> bool {
        let mut slot = self.inner.sink.lock();
        match slot.as_mut() {
            Some(sink) => {
                sink(event);
                true
            }
            None => false,
        }
    }

    /// Everything written to the process, lossily decoded.
    pub fn written(&self) -> String {
        String::from_utf8_lossy(&self.inner.written.lock()).into_owned()
    }

    pub fn resizes(&self) -> Vec<(u16, u16)> {
        self.inner.resizes.lock().clone()
    }

    /// Make writes and resizes fail from now on.
    pub fn fail_io(&self, fail: bool) {
        self.inner.fail_io.store(fail, Ordering::SeqCst);
    }

    pub fn was_terminated(&self) -> bool {
        self.inner.terminated.load(Ordering::SeqCst)
    }

    pub fn was_killed(&self) -> bool {
        self.inner.killed.load(Ordering::SeqCst)
    }

    pub fn has_exited(&self) -> bool {
        self.inner.exited.load(Ordering::SeqCst)
    }
}

/// A delivery target that records what it receives.
#[derive(Default)]
pub struct RecordingTarget {
    events: Mutex<Vec<SessionEvent>>,
    attempts: AtomicUsize,
    destroyed: AtomicBool,
    fail: AtomicBool,
}

impl RecordingTarget {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<SessionEvent> {
        self.events.lock().clone()
    }

    /// Number of `deliver` calls, including failed ones.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// All output delivered for `id`, concatenated.
    pub fn output_for(&self, id: &str) -> String {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                SessionEvent::Output { id: event_id, data } if event_id == id => {
                    Some(data.as_str())
                }
                _ => None,
            })
            .collect()
    }

    pub fn exits_for(&self, id: &str) -> Vec<u32> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                SessionEvent::Exit { id: event_id, exit_code } if event_id == id => {
                    Some(*exit_code)
                }
                _ => None,
            })
            .collect()
    }

    pub fn destroy(&self) {
        self.destroyed.store(true, Ordering::SeqCst);
    }

    pub fn fail_sends(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

impl DeliveryTarget for RecordingTarget {
    fn deliver(&self, event: SessionEvent) -> Result<(), DeliveryError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(DeliveryError::Failed("injected failure".to_string()));
        }
        self.events.lock().push(event);
        Ok(())
    }

    fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }
}
