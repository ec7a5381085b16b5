use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::{mpsc, Arc};

use portable_pty::{native_pty_system, Child, ChildKiller, CommandBuilder, MasterPty, PtySize};

use crate::io_thread::{start_io_thread, start_writer_thread, ReapState};

/// Default terminal width for a freshly spawned session.
pub const DEFAULT_COLS: u16 = 80;
/// Default terminal height for a freshly spawned session.
pub const DEFAULT_ROWS: u16 = 24;

/// Terminal type advertised to every child process.
pub const TERM: &str = "xterm-256color";
/// Locale forced on every child process so output is always UTF-8.
pub const UTF8_LOCALE: &str = "en_US.UTF-8";

/// Errors from PTY operations.
#[derive(Debug, thiserror::Error)]
pub enum PtyError {
    #[error("PTY spawn failed: {0}")]
    SpawnFailed(String),
    #[error("PTY I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("PTY resize failed: {0}")]
    ResizeFailed(String),
    #[error("failed to signal process {pid}: {reason}")]
    Signal { pid: u32, reason: String },
    #[error("process events are already attached")]
    AlreadyAttached,
}

/// Something a child process reports back asynchronously.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessEvent {
    /// A chunk of decoded output. Chunk boundaries carry no meaning.
    Output(String),
    /// The process is gone. Emitted once, after the last output chunk.
    Exit(u32),
}

/// Receives [`ProcessEvent`]s on whatever thread the spawner reads from.
pub type EventSink = Box<dyn FnMut(ProcessEvent) + Send>;

/// Everything needed to start one shell process inside a PTY.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnCommand {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    /// Extra variables layered over the inherited environment.
    pub env: Vec<(String, String)>,
    pub cols: u16,
    pub rows: u16,
}

impl SpawnCommand {
    pub fn new(program: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: cwd.into(),
            env: Vec::new(),
            cols: DEFAULT_COLS,
            rows: DEFAULT_ROWS,
        }
    }

    /// A command running the user's default shell.
    pub fn shell(cwd: impl Into<PathBuf>) -> Self {
        Self::new(default_shell(), cwd)
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn size(mut self, cols: u16, rows: u16) -> Self {
        self.cols = cols;
        self.rows = rows;
        self
    }

    /// The variables applied on top of the inherited environment, in order.
    ///
    /// Caller-supplied entries come first; the locale and terminal type are
    /// appended last so they always win.
    pub fn terminal_env(&self) -> Vec<(String, String)> {
        let mut vars = self.env.clone();
        for key in ["LANG", "LC_ALL", "LC_CTYPE"] {
            vars.push((key.to_string(), UTF8_LOCALE.to_string()));
        }
        vars.push(("TERM".to_string(), TERM.to_string()));
        vars.push(("COLORTERM".to_string(), "truecolor".to_string()));
        vars
    }
}

/// A running child process as seen by the session layer.
///
/// `write` and `resize` on a process that already exited are no-ops. None of
/// the methods may block on the child.
pub trait Process: Send {
    fn pid(&self) -> u32;

    /// Start delivering events to `sink`. May only be called once.
    ///
    /// Output produced before this call is held by the OS and delivered
    /// once the sink is attached.
    fn attach(&mut self, sink: EventSink) -> Result<(), PtyError>;

    /// Queue input for the process.
    fn write(&mut self, data: &[u8]) -> Result<(), PtyError>;

    fn resize(&mut self, cols: u16, rows: u16) -> Result<(), PtyError>;

    /// Ask the process (and its process group) to hang up.
    fn terminate(&mut self) -> Result<(), PtyError>;

    /// Forcibly kill the process (and its process group).
    fn kill(&mut self) -> Result<(), PtyError>;

    fn has_exited(&self) -> bool;
}

/// Starts processes. The seam that lets tests swap in a fake.
pub trait Spawner: Send + Sync {
    fn spawn(&self, command: &SpawnCommand) -> Result<Box<dyn Process>, PtyError>;
}

/// Spawns real processes through the platform's native PTY system.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeSpawner;

impl Spawner for NativeSpawner {
    fn spawn(&self, command: &SpawnCommand) -> Result<Box<dyn Process>, PtyError> {
        Ok(Box::new(PtyHandle::spawn(command)?))
    }
}

/// Owns a portable-pty master and killer for one child process.
///
/// The writer lives on its own thread behind `input`. The reader and the
/// `Child` itself are handed to a dedicated I/O thread on
/// [`Process::attach`]; that thread reaps the child and reports its exit code.
pub struct PtyHandle {
    pid: u32,
    master: Box<dyn MasterPty + Send>,
    input: mpsc::Sender<Vec<u8>>,
    killer: Box<dyn ChildKiller + Send + Sync>,
    pending: Option<(Box<dyn Read + Send>, Box<dyn Child + Send + Sync>)>,
    reap: Arc<ReapState>,
}

impl PtyHandle {
    /// Spawn `command` inside a new PTY.
    pub fn spawn(command: &SpawnCommand) -> Result<Self, PtyError> {
        let pty_system = native_pty_system();

        let pair = pty_system
            .openpty(PtySize {
                rows: command.rows,
                cols: command.cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| PtyError::SpawnFailed(format!("failed to open PTY: {e}")))?;

        let mut cmd = CommandBuilder::new(&command.program);
        cmd.args(&command.args);
        cmd.cwd(command.cwd.as_os_str());
        for (key, value) in command.terminal_env() {
            cmd.env(key, value);
        }

        let mut child = pair.slave.spawn_command(cmd).map_err(|e| {
            PtyError::SpawnFailed(format!("failed to spawn {}: {e}", command.program))
        })?;
        // The slave side must not stay open here or the reader never sees EOF.
        drop(pair.slave);

        let streams = match pair.master.try_clone_reader() {
            Ok(reader) => pair.master.take_writer().map(|writer| (reader, writer)),
            Err(e) => Err(e),
        };
        let (reader, writer) = match streams {
            Ok(streams) => streams,
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(PtyError::SpawnFailed(format!("failed to open PTY streams: {e}")));
            }
        };

        let pid = child.process_id().unwrap_or(0);
        let input = match start_writer_thread(pid, writer) {
            Ok(input) => input,
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(e);
            }
        };
        let killer = child.clone_killer();

        Ok(Self {
            pid,
            master: pair.master,
            input,
            killer,
            pending: Some((reader, child)),
            reap: Arc::new(ReapState::default()),
        })
    }

    #[cfg(unix)]
    fn signal_group(&mut self, signal: libc::c_int) -> Result<(), PtyError> {
        if self.pid == 0 {
            return self.killer.kill().map_err(PtyError::from);
        }
        // portable-pty makes the child a session leader, so its pid is also
        // the process group id.
        let rc = unsafe { libc::kill(-(self.pid as libc::pid_t), signal) };
        if rc == 0 {
            return Ok(());
        }
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::ESRCH) {
            return Ok(());
        }
        Err(PtyError::Signal {
            pid: self.pid,
            reason: err.to_string(),
        })
    }
}

impl Process for PtyHandle {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn attach(&mut self, sink: EventSink) -> Result<(), PtyError> {
        let (reader, child) = self.pending.take().ok_or(PtyError::AlreadyAttached)?;
        start_io_thread(self.pid, reader, child, Arc::clone(&self.reap), sink)
    }

    fn write(&mut self, data: &[u8]) -> Result<(), PtyError> {
        if self.has_exited() {
            return Ok(());
        }
        if self.input.send(data.to_vec()).is_err() {
            log::debug!("pty {} input closed, dropping {} bytes", self.pid, data.len());
        }
        Ok(())
    }

    fn resize(&mut self, cols: u16, rows: u16) -> Result<(), PtyError> {
        if self.has_exited() {
            return Ok(());
        }
        self.master
            .resize(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| PtyError::ResizeFailed(format!("{e}")))
    }

    fn terminate(&mut self) -> Result<(), PtyError> {
        let reap = Arc::clone(&self.reap);
        reap.signal_if_live(|| {
            #[cfg(unix)]
            {
                self.signal_group(libc::SIGHUP)
            }
            #[cfg(not(unix))]
            {
                self.killer.kill().map_err(PtyError::from)
            }
        })
    }

    fn kill(&mut self) -> Result<(), PtyError> {
        let reap = Arc::clone(&self.reap);
        reap.signal_if_live(|| {
            #[cfg(unix)]
            {
                self.signal_group(libc::SIGKILL)
            }
            #[cfg(not(unix))]
            {
                self.killer.kill().map_err(PtyError::from)
            }
        })
    }

    fn has_exited(&self) -> bool {
        self.reap.is_reaped()
    }
}

impl Drop for PtyHandle {
    fn drop(&mut self) {
        if !self.has_exited() {
            let _ = self.kill();
        }
        // Never attached: nobody else will reap the child.
        if let Some((_, mut child)) = self.pending.take() {
            let _ = child.wait();
        }
    }
}

/// Returns the user's default shell.
///
/// Windows always gets PowerShell. Elsewhere `$SHELL` is used, falling back
/// to `/bin/sh` when it is unset or empty.
pub fn default_shell() -> String {
    if cfg!(windows) {
        return "powershell.exe".to_string();
    }
    std::env::var("SHELL")
        .ok()
        .filter(|shell| !shell.is_empty())
        .unwrap_or_else(|| "/bin/sh".to_string())
}

/// Resolve the working directory for a new session, falling back to the
/// current directory when `cwd` does not exist.
pub fn resolve_cwd(cwd: &Path) -> PathBuf {
    if cwd.is_dir() {
        return cwd.to_path_buf();
    }
    log::warn!("working directory {} does not exist, using current directory", cwd.display());
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}
