use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::pty::{
    resolve_cwd, EventSink, NativeSpawner, ProcessEvent, PtyError, SpawnCommand, Spawner,
    DEFAULT_COLS, DEFAULT_ROWS,
};
use crate::registry::SessionRegistry;
use crate::session::{Session, SessionId, SessionInfo};
use crate::target::{DeliveryTarget, SessionEvent};

const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(20);
/// How long `shutdown` waits for killed processes to be reaped.
const KILL_WAIT: Duration = Duration::from_millis(500);

/// Errors from creating a session. Every other manager operation is
/// infallible from the caller's point of view.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("no delivery target to send session output to")]
    NoDeliveryTarget,
    #[error("session already exists: {0}")]
    Duplicate(SessionId),
    #[error(transparent)]
    Spawn(#[from] PtyError),
}

/// How sessions are spawned and torn down.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Shell program. `None` means [`crate::default_shell`].
    pub shell: Option<String>,
    pub shell_args: Vec<String>,
    /// Extra environment for every session.
    pub env: Vec<(String, String)>,
    pub cols: u16,
    pub rows: u16,
    /// How long a closed session may take to exit after hang-up before it is
    /// killed. Zero kills immediately.
    pub grace_period: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            shell: None,
            shell_args: Vec::new(),
            env: Vec::new(),
            cols: DEFAULT_COLS,
            rows: DEFAULT_ROWS,
            grace_period: Duration::from_millis(1000),
        }
    }
}

/// What happened to the sessions alive at shutdown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Sessions that were asked to hang up.
    pub terminated: usize,
    /// Sessions still alive after the grace period and killed.
    pub killed: usize,
}

/// Owns every PTY session and routes their I/O.
///
/// Process events never hold on to a `Session`: each one looks the session up
/// in the registry by id and generation when it arrives, so closing or
/// invalidating a session takes effect even for events already in flight.
pub struct SessionManager {
    registry: Arc<SessionRegistry>,
    spawner: Arc<dyn Spawner>,
    config: ManagerConfig,
    next_generation: AtomicU64,
    /// Closed sessions still inside their grace period.
    closing: Arc<Mutex<Vec<Arc<Session>>>>,
}

impl SessionManager {
    pub fn new(
        spawner: Arc<dyn Spawner>,
        registry: Arc<SessionRegistry>,
        config: ManagerConfig,
    ) -> Self {
        Self {
            registry,
            spawner,
            config,
            next_generation: AtomicU64::new(1),
            closing: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A manager spawning real processes with its own empty registry.
    pub fn native(config: ManagerConfig) -> Self {
        Self::new(
            Arc::new(NativeSpawner),
            Arc::new(SessionRegistry::new()),
            config,
        )
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Spawn a shell in `cwd` and register it as session `id`.
    ///
    /// A `cwd` that does not exist falls back to the current directory.
    /// Requires a live delivery target. Ids must be unique among live
    /// sessions; a duplicate is rejected before anything is spawned.
    pub fn create_session(
        &self,
        id: &str,
        cwd: impl AsRef<Path>,
        target: Option<&Arc<dyn DeliveryTarget>>,
    ) -> Result<SessionInfo, SessionError> {
        let target = match target {
            Some(target) if !target.is_destroyed() => Arc::downgrade(target),
            _ => return Err(SessionError::NoDeliveryTarget),
        };
        if self.registry.contains(id) {
            return Err(SessionError::Duplicate(id.to_string()));
        }

        let cwd = resolve_cwd(cwd.as_ref());
        let command = self.spawn_command(&cwd);
        let process = self.spawner.spawn(&command)?;

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let session = Arc::new(Session::new(
            id.to_string(),
            generation,
            cwd.clone(),
            process,
            target,
        ));

        if self.registry.insert(Arc::clone(&session)).is_err() {
            // Lost a race with another create for the same id.
            log::warn!("session {id} was created concurrently, discarding new process");
            let _ = session.kill();
            return Err(SessionError::Duplicate(id.to_string()));
        }

        let sink = event_sink(Arc::downgrade(&self.registry), id.to_string(), generation);
        if let Err(e) = session.attach(sink) {
            self.registry.remove_if_current(id, generation);
            let _ = session.kill();
            return Err(e.into());
        }

        log::info!(
            "created session {id} (pid {}) in {}",
            session.pid(),
            cwd.display()
        );
        Ok(session.info())
    }

    fn spawn_command(&self, cwd: &Path) -> SpawnCommand {
        let mut command = match &self.config.shell {
            Some(shell) => SpawnCommand::new(shell.clone(), cwd),
            None => SpawnCommand::shell(cwd),
        }
        .size(self.config.cols, self.config.rows);
        command.args = self.config.shell_args.clone();
        command.env = self.config.env.clone();
        command
    }

    /// Forward input to session `id`. Unknown ids and write failures are
    /// logged and otherwise ignored.
    pub fn write_input(&self, id: &str, data: &[u8]) {
        let Some(session) = self.registry.get(id) else {
            log::debug!("dropping input for unknown session {id}");
            return;
        };
        if let Err(e) = session.write_input(data) {
            log::warn!("write to session {id} failed: {e}");
        }
    }

    /// Resize session `id`. Same drop semantics as [`Self::write_input`].
    pub fn resize(&self, id: &str, cols: u16, rows: u16) {
        let Some(session) = self.registry.get(id) else {
            log::debug!("dropping resize for unknown session {id}");
            return;
        };
        if let Err(e) = session.resize(cols, rows) {
            log::warn!("resize of session {id} failed: {e}");
        }
    }

    /// Stop delivering events for `id` while leaving its process running.
    pub fn invalidate_target(&self, id: &str) {
        if let Some(session) = self.registry.get(id) {
            session.invalidate_target();
        }
    }

    /// Stop delivering events for every session. Processes keep running.
    pub fn invalidate_all_targets(&self) {
        self.registry.for_each(|session| {
            session.invalidate_target();
        });
    }

    /// Close session `id`: invalidate its target, hang up the process and
    /// drop it from the registry. Closing twice or closing an unknown id is
    /// a no-op. No exit event is delivered for a closed session.
    pub fn close_session(&self, id: &str) {
        let Some(session) = self.registry.get(id) else {
            log::debug!("close for unknown session {id}");
            return;
        };
        self.close(session);
    }

    /// Close every live session. Converges with concurrent
    /// [`Self::close_session`] calls: each entry is closed by exactly one of them.
    pub fn close_all(&self) {
        self.invalidate_all_targets();
        let sessions = self.registry.drain();
        let count = sessions.len();
        for session in sessions {
            self.close(session);
        }
        if count > 0 {
            log::info!("closed {count} sessions");
        }
    }

    fn close(&self, session: Arc<Session>) {
        // Target first, so a dying process cannot reach it with a final event.
        session.invalidate_target();
        if !session.begin_closing() {
            return;
        }
        if let Err(e) = session.terminate() {
            log::warn!("failed to hang up session {}: {e}", session.id());
        }
        self.registry
            .remove_if_current(session.id(), session.generation());
        log::info!("closed session {}", session.id());
        self.reap(session);
    }

    /// Make sure a closing session's process is really gone.
    fn reap(&self, session: Arc<Session>) {
        let grace = self.config.grace_period;
        if session.has_exited() {
            session.mark_closed();
            return;
        }
        if grace.is_zero() {
            force_kill(&session);
            session.mark_closed();
            return;
        }

        // Tracked until reaped so that shutdown can still kill it.
        self.closing.lock().push(Arc::clone(&session));
        let closing = Arc::clone(&self.closing);
        let reaped = Arc::clone(&session);
        let spawned = std::thread::Builder::new()
            .name(format!("pty-reap-{}", session.pid()))
            .spawn(move || {
                wait_for_exit(std::slice::from_ref(&reaped), grace);
                if !reaped.has_exited() {
                    force_kill(&reaped);
                }
                reaped.mark_closed();
                closing.lock().retain(|s| !Arc::ptr_eq(s, &reaped));
            });
        if let Err(e) = spawned {
            log::warn!("could not start reaper for session {}: {e}", session.id());
            self.closing.lock().retain(|s| !Arc::ptr_eq(s, &session));
            force_kill(&session);
            session.mark_closed();
        }
    }

    /// Tear down every session for application exit.
    ///
    /// Targets are invalidated first, then every process is asked to hang up.
    /// Whatever is still alive after `grace` is killed, including sessions
    /// closed earlier that are still inside their own grace period. All
    /// handles are released before this returns.
    pub fn shutdown(&self, grace: Duration) -> ShutdownReport {
        self.invalidate_all_targets();
        let mut sessions = self.registry.drain();

        let mut report = ShutdownReport::default();
        for session in &sessions {
            session.invalidate_target();
            if session.begin_closing() {
                if let Err(e) = session.terminate() {
                    log::warn!("failed to hang up session {}: {e}", session.id());
                }
                report.terminated += 1;
            }
        }

        sessions.append(&mut self.closing.lock());
        wait_for_exit(&sessions, grace);

        let mut killed = Vec::new();
        for session in &sessions {
            if !session.has_exited() {
                force_kill(session);
                killed.push(Arc::clone(session));
            }
        }
        report.killed = killed.len();
        wait_for_exit(&killed, KILL_WAIT);
        for session in &sessions {
            session.mark_closed();
        }
        drop(killed);
        drop(sessions);

        log::info!(
            "shutdown complete: {} sessions hung up, {} killed",
            report.terminated,
            report.killed
        );
        report
    }

    /// Snapshot of all live sessions, sorted by id.
    pub fn sessions(&self) -> Vec<SessionInfo> {
        let mut sessions = Vec::with_capacity(self.registry.len());
        self.registry.for_each(|session| sessions.push(session.info()));
        sessions.sort_by(|a, b| a.id.cmp(&b.id));
        sessions
    }

    pub fn len(&self) -> usize {
        self.registry.len()
    }

    /// Closed sessions whose process has not been reaped yet.
    pub fn closing_count(&self) -> usize {
        self.closing.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn force_kill(session: &Session) {
    log::warn!(
        "session {} (pid {}) did not exit, killing",
        session.id(),
        session.pid()
    );
    if let Err(e) = session.kill() {
        log::warn!("failed to kill session {}: {e}", session.id());
    }
}

/// Poll until every session has exited or `grace` elapses.
fn wait_for_exit(sessions: &[Arc<Session>], grace: Duration) {
    let deadline = Instant::now() + grace;
    while sessions.iter().any(|s| !s.has_exited()) && Instant::now() < deadline {
        std::thread::sleep(EXIT_POLL_INTERVAL);
    }
}

fn event_sink(registry: Weak<SessionRegistry>, id: SessionId, generation: u64) -> EventSink {
    Box::new(move |event| {
        let Some(registry) = registry.upgrade() else {
            return;
        };
        route_event(&registry, &id, generation, event);
    })
}

/// Deliver one process event to whatever the registry says is current.
fn route_event(registry: &SessionRegistry, id: &str, generation: u64, event: ProcessEvent) {
    match event {
        ProcessEvent::Output(data) => {
            let session = registry
                .get(id)
                .filter(|session| session.generation() == generation);
            if let Some(session) = session {
                session.deliver(SessionEvent::Output {
                    id: id.to_string(),
                    data,
                });
            }
        }
        ProcessEvent::Exit(exit_code) => {
            // Only whoever removes the entry reports the exit, so it is
            // reported at most once and never after an explicit close.
            let Some(session) = registry.remove_if_current(id, generation) else {
                log::debug!("exit of closed session {id} ignored");
                return;
            };
            log::info!("session {id} exited with code {exit_code}");
            session.deliver(SessionEvent::Exit {
                id: id.to_string(),
                exit_code,
            });
            session.mark_closed();
        }
    }
}
