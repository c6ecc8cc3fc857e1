//! Process management

use std::ffi::OsString;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use crate::event_loop::{EventLoop, ExitFuture};
use crate::options::{DEFAULT_MAX_ARGS, LaunchRequest, ProcessOptions, STDIO_COUNT, StdioRedirect};
use crate::pipes::{Pipe, PipeDirection};
use crate::process_events::{ProcessEvent, Subscribers};
use crate::utils::lock;
use crate::{error, sys, trace_categories};

/// Callback receiving the exit code of a managed process.
pub type ExitCallback = Box<dyn FnMut(i64) + Send>;

/// Callback receiving each chunk written by a managed process to its stdout.
pub type OutputCallback = Box<dyn FnMut(&[u8]) + Send>;

/// How a child process ended.
#[derive(Clone, Copy, Debug, Eq, PartialEq, serde::Serialize)]
pub struct ExitStatus {
    code: i64,
    signal: Option<i32>,
}

impl ExitStatus {
    /// Creates a status from its parts.
    pub const fn new(code: i64, signal: Option<i32>) -> Self {
        Self { code, signal }
    }

    /// Returns the exit code. A child terminated by a signal reports `128 + signal`.
    pub const fn code(&self) -> i64 {
        self.code
    }

    /// Returns the signal that terminated the child, if any.
    pub const fn signal(&self) -> Option<i32> {
        self.signal
    }

    /// Returns whether the child exited normally with code 0.
    pub const fn success(&self) -> bool {
        self.code == 0 && self.signal.is_none()
    }

    /// Status reported when waiting on the child failed.
    pub(crate) const fn unknown() -> Self {
        Self::new(-1, None)
    }
}

impl From<std::process::ExitStatus> for ExitStatus {
    fn from(status: std::process::ExitStatus) -> Self {
        match sys::process::exit_parts(status) {
            (Some(code), _) => Self::new(i64::from(code), None),
            (None, Some(signal)) => Self::new(128 + i64::from(signal), Some(signal)),
            (None, None) => Self::unknown(),
        }
    }
}

/// Where a managed process is in its lifecycle.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ProcessState {
    /// No process has been started yet.
    #[default]
    Idle,
    /// A process is running.
    Running {
        /// Its process identifier.
        pid: sys::process::ProcessId,
    },
    /// The process has exited and its association has been released.
    Exited {
        /// The identifier it had.
        pid: sys::process::ProcessId,
        /// How it ended.
        status: ExitStatus,
    },
}

/// State shared between a managed process and the tasks running on its behalf.
#[derive(Default)]
struct Shared {
    state: Mutex<ProcessState>,
    on_exit: Mutex<Option<ExitCallback>>,
    on_stdout: Mutex<Option<OutputCallback>>,
    subscribers: Mutex<Subscribers>,
}

impl Shared {
    fn emit(&self, event: impl FnOnce() -> ProcessEvent) {
        let mut subscribers = lock(&self.subscribers);
        if !subscribers.is_empty() {
            subscribers.emit(&event());
        }
    }

    fn deliver_output(&self, pid: sys::process::ProcessId, chunk: &[u8]) {
        if let Some(callback) = lock(&self.on_stdout).as_mut() {
            callback(chunk);
        }
        self.emit(|| ProcessEvent::Output {
            pid,
            data: chunk.to_vec(),
        });
    }

    fn deliver_exit(&self, pid: sys::process::ProcessId, status: ExitStatus) {
        // Release the association first, so a kill() issued from or after the
        // callback cannot signal a reaped (and possibly reused) pid.
        *lock(&self.state) = ProcessState::Exited { pid, status };

        self.emit(|| ProcessEvent::Exited {
            pid,
            exit_code: status.code(),
            signal: status.signal(),
        });

        if let Some(callback) = lock(&self.on_exit).as_mut() {
            callback(status.code());
        }
    }
}

/// A child process whose stdin and stdout are piped to the parent.
///
/// Configure the public fields, register callbacks, then [`spawn`](Self::spawn).
/// Output is delivered chunk by chunk to the stdout callback; exit is delivered
/// once to the exit callback. Both run on the event loop.
///
/// Dropping a running process sends it [`crate::TERMINATE`] without waiting
/// for it to exit.
pub struct ManagedProcess {
    /// Executable to start. When unset, the first argument is used.
    pub file: Option<PathBuf>,
    /// Working directory for the child. When unset, the parent's is inherited.
    pub cwd: Option<PathBuf>,
    /// Argument vector, starting with `argv[0]`.
    pub args: Vec<OsString>,
    /// Environment variables added to the child's environment.
    pub env: Vec<(OsString, OsString)>,
    /// Whether to start the child from an empty environment.
    pub clear_env: bool,
    /// Whether the child shares the parent's stderr; otherwise it is discarded.
    pub inherit_stderr: bool,
    /// Largest accepted number of arguments; `None` for no limit.
    pub max_args: Option<usize>,

    event_loop: Arc<dyn EventLoop>,
    stdin: Pipe,
    stdout: Pipe,
    options: ProcessOptions,
    shared: Arc<Shared>,
}

impl ManagedProcess {
    /// Creates a process bound to the given event loop. Both pipes are created
    /// here; no OS process exists until [`spawn`](Self::spawn).
    pub fn new(event_loop: Arc<dyn EventLoop>) -> Result<Self, error::Error> {
        Self::with_args(event_loop, std::iter::empty::<OsString>())
    }

    /// Creates a process bound to the given event loop, seeded with arguments.
    ///
    /// # Arguments
    ///
    /// * `event_loop` - The loop the process's I/O and exit notification run on.
    /// * `args` - Initial argument vector, starting with `argv[0]`.
    pub fn with_args<I, S>(event_loop: Arc<dyn EventLoop>, args: I) -> Result<Self, error::Error>
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        Ok(Self {
            file: None,
            cwd: None,
            args: args.into_iter().map(Into::into).collect(),
            env: Vec::new(),
            clear_env: false,
            inherit_stderr: false,
            max_args: Some(DEFAULT_MAX_ARGS),
            event_loop,
            stdin: Pipe::new(PipeDirection::ChildReads)?,
            stdout: Pipe::new(PipeDirection::ChildWrites)?,
            options: ProcessOptions::default(),
            shared: Arc::new(Shared::default()),
        })
    }

    /// Registers the callback invoked with the exit code once the process exits.
    pub fn on_exit(&mut self, callback: impl FnMut(i64) + Send + 'static) {
        *lock(&self.shared.on_exit) = Some(Box::new(callback));
    }

    /// Registers the callback invoked with each chunk the process writes to stdout.
    pub fn on_stdout(&mut self, callback: impl FnMut(&[u8]) + Send + 'static) {
        *lock(&self.shared.on_stdout) = Some(Box::new(callback));
    }

    /// Returns a channel receiving every subsequent [`ProcessEvent`] of this process.
    pub fn subscribe(&self) -> tokio::sync::mpsc::UnboundedReceiver<ProcessEvent> {
        lock(&self.shared.subscribers).subscribe()
    }

    /// Replaces the stdio redirection table used by the next spawn: entry 0 is
    /// stdin, entry 1 is stdout. A stream set to [`StdioRedirect::Ignore`] is
    /// connected to the null device instead of its pipe.
    pub fn set_stdio(&mut self, stdio: [StdioRedirect; STDIO_COUNT]) {
        self.options = ProcessOptions::with_stdio(stdio);
    }

    /// Starts the child process.
    ///
    /// Returns the child's process identifier. Validation failures and OS
    /// rejection leave the instance idle so it can be reconfigured and retried.
    /// [`error::Error::ReadStartFailed`] and [`error::Error::WriteStartFailed`]
    /// are reported after the child was created: it keeps running and
    /// [`pid`](Self::pid) is set, so the caller decides whether to
    /// [`kill`](Self::kill) it. Both pipes are started even if one fails; the
    /// read failure is reported first, and its stdout end stays in place so
    /// reading can be started again.
    pub fn spawn(&mut self) -> Result<sys::process::ProcessId, error::Error> {
        if self.state() != ProcessState::Idle {
            return Err(error::Error::AlreadySpawned);
        }

        self.options = self.options.rebuild(&LaunchRequest {
            file: self.file.as_deref(),
            args: &self.args,
            cwd: self.cwd.as_deref(),
            env: &self.env,
            clear_env: self.clear_env,
            inherit_stderr: self.inherit_stderr,
            max_args: self.max_args,
        })?;

        let executable = self.options.file().to_path_buf();
        let command = self
            .options
            .to_command(&self.stdin, &self.stdout)
            .map_err(|e| match e {
                error::Error::IoError(source) => error::Error::SpawnFailed {
                    executable: executable.clone(),
                    source,
                },
                other => other,
            })?;

        tracing::debug!(
            target: trace_categories::PROCESS,
            "spawning {} with args {:?}",
            executable.display(),
            self.options.args()
        );

        let spawned = self
            .event_loop
            .create_process(command)
            .map_err(|source| error::Error::SpawnFailed {
                executable: executable.clone(),
                source,
            })?;
        let pid = spawned.pid;

        // The child holds its own copies now.
        self.stdin.release_child_end();
        self.stdout.release_child_end();

        *lock(&self.shared.state) = ProcessState::Running { pid };
        self.shared.emit(|| ProcessEvent::Spawned {
            pid,
            program: executable,
            args: self.options.display_args(),
            cwd: self.options.cwd().map(PathBuf::from),
        });

        self.event_loop
            .schedule(Box::pin(watch_exit(Arc::clone(&self.shared), pid, spawned.exit)));

        let on_chunk = Arc::clone(&self.shared);
        let on_close = Arc::clone(&self.shared);
        let reading = self
            .stdout
            .read_start_with_close(
                self.event_loop.as_ref(),
                Box::new(move |chunk| on_chunk.deliver_output(pid, chunk)),
                Box::new(move || on_close.emit(|| ProcessEvent::StdoutClosed { pid })),
            )
            .map_err(|e| error::Error::ReadStartFailed(Box::new(e)));

        // Stdin is started regardless, so a child left running stays reachable.
        let writing = self
            .stdin
            .start_writing(self.event_loop.as_ref())
            .map_err(|e| error::Error::WriteStartFailed(Box::new(e)));

        if let Err(e) = &writing {
            tracing::debug!(target: trace_categories::PIPES, "process {pid}: {e}");
        }

        reading.and(writing).map(|()| pid)
    }

    /// Returns the pipe connected to the child's stdin.
    pub const fn stdin(&self) -> &Pipe {
        &self.stdin
    }

    /// Returns the pipe connected to the child's stdout.
    pub const fn stdout(&self) -> &Pipe {
        &self.stdout
    }

    /// Sends a signal to the running process. Success means the OS accepted the
    /// signal, not that the process has exited.
    pub fn kill(&self, signal: sys::signal::Signal) -> Result<(), error::Error> {
        let pid = self.pid().ok_or(error::Error::InvalidKillTarget)?;
        self.event_loop.send_signal(pid, signal)
    }

    /// Sends the default termination signal to the running process.
    pub fn terminate(&self) -> Result<(), error::Error> {
        self.kill(sys::signal::TERMINATE)
    }

    /// Returns the identifier of the running process, if there is one.
    pub fn pid(&self) -> Option<sys::process::ProcessId> {
        match self.state() {
            ProcessState::Running { pid } => Some(pid),
            ProcessState::Idle | ProcessState::Exited { .. } => None,
        }
    }

    /// Returns how the process ended, once it has.
    pub fn exit_status(&self) -> Option<ExitStatus> {
        match self.state() {
            ProcessState::Exited { status, .. } => Some(status),
            ProcessState::Idle | ProcessState::Running { .. } => None,
        }
    }

    /// Returns the current lifecycle state.
    pub fn state(&self) -> ProcessState {
        *lock(&self.shared.state)
    }

    /// Returns the options resolved by the most recent spawn attempt.
    pub const fn options(&self) -> &ProcessOptions {
        &self.options
    }
}

impl Drop for ManagedProcess {
    fn drop(&mut self) {
        if let Some(pid) = self.pid() {
            tracing::debug!(target: trace_categories::PROCESS, "terminating process {pid} on drop");
            if let Err(e) = self.terminate() {
                tracing::warn!(
                    target: trace_categories::PROCESS,
                    "failed to terminate process {pid}: {e}"
                );
            }
        }
    }
}

async fn watch_exit(shared: Arc<Shared>, pid: sys::process::ProcessId, exit: ExitFuture) {
    let status = match exit.await {
        Ok(status) => status,
        Err(e) => {
            tracing::warn!(target: trace_categories::PROCESS, "failed waiting on process {pid}: {e}");
            ExitStatus::unknown()
        }
    };

    tracing::debug!(
        target: trace_categories::PROCESS,
        "process {pid} exited with code {} (signal: {:?})",
        status.code(),
        status.signal()
    );

    shared.deliver_exit(pid, status);
}
