//! The event loop a managed process is bound to.
//!
//! The loop owns everything asynchronous: creating the OS process and observing its
//! exit, registering pipe ends for non-blocking I/O, delivering signals, and running
//! the tasks that pump data. [`crate::ManagedProcess`] only holds the logical
//! association with the child; it never touches reactor state directly.

use futures::future::BoxFuture;

use crate::process::ExitStatus;
use crate::{error, sys, trace_categories};

/// Future resolving when a spawned child exits.
pub type ExitFuture = BoxFuture<'static, std::io::Result<ExitStatus>>;

/// A child process freshly created by an [`EventLoop`].
pub struct SpawnedProcess {
    /// Identifier the OS assigned to the child.
    pub pid: sys::process::ProcessId,
    /// Resolves once the child has exited and been reaped.
    pub exit: ExitFuture,
}

/// The registration and dispatch interface managed processes need from a reactor.
pub trait EventLoop: Send + Sync {
    /// Creates the OS process described by `command` and registers for its exit.
    fn create_process(&self, command: std::process::Command)
    -> std::io::Result<SpawnedProcess>;

    /// Registers the parent's read end of a pipe for asynchronous reads.
    fn register_reader(
        &self,
        reader: sys::pipes::PipeReader,
    ) -> std::io::Result<sys::pipes::AsyncPipeReader>;

    /// Registers the parent's write end of a pipe for asynchronous writes.
    fn register_writer(
        &self,
        writer: sys::pipes::PipeWriter,
    ) -> std::io::Result<sys::pipes::AsyncPipeWriter>;

    /// Delivers a signal to a process.
    fn send_signal(
        &self,
        pid: sys::process::ProcessId,
        signal: sys::signal::Signal,
    ) -> Result<(), error::Error>;

    /// Runs a task on the loop. The task is detached.
    fn schedule(&self, task: BoxFuture<'static, ()>);
}

/// An [`EventLoop`] backed by a tokio runtime.
#[derive(Clone, Debug)]
pub struct TokioEventLoop {
    handle: tokio::runtime::Handle,
}

impl TokioEventLoop {
    /// Binds to the runtime of the current context.
    pub fn current() -> Result<Self, error::Error> {
        let handle =
            tokio::runtime::Handle::try_current().map_err(|_err| error::Error::NoEventLoop)?;
        Ok(Self { handle })
    }

    /// Binds to the runtime behind the given handle.
    pub const fn from_handle(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }

    /// Returns the runtime handle.
    pub const fn handle(&self) -> &tokio::runtime::Handle {
        &self.handle
    }
}

impl EventLoop for TokioEventLoop {
    fn create_process(
        &self,
        command: std::process::Command,
    ) -> std::io::Result<SpawnedProcess> {
        let _guard = self.handle.enter();
        spawn_child(command)
    }

    fn register_reader(
        &self,
        reader: sys::pipes::PipeReader,
    ) -> std::io::Result<sys::pipes::AsyncPipeReader> {
        let _guard = self.handle.enter();
        sys::pipes::register_reader(reader)
    }

    fn register_writer(
        &self,
        writer: sys::pipes::PipeWriter,
    ) -> std::io::Result<sys::pipes::AsyncPipeWriter> {
        let _guard = self.handle.enter();
        sys::pipes::register_writer(writer)
    }

    fn send_signal(
        &self,
        pid: sys::process::ProcessId,
        signal: sys::signal::Signal,
    ) -> Result<(), error::Error> {
        sys::signal::kill_process(pid, signal)
    }

    fn schedule(&self, task: BoxFuture<'static, ()>) {
        drop(self.handle.spawn(task));
    }
}

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        fn spawn_child(command: std::process::Command) -> std::io::Result<SpawnedProcess> {
            use futures::FutureExt;

            let mut child = tokio::process::Command::from(command).spawn()?;

            let Some(pid) = child.id().and_then(sys::process::pid_from_raw) else {
                // Not expected for a child we have not waited on yet; don't leak it.
                if let Err(e) = child.start_kill() {
                    tracing::debug!(
                        target: trace_categories::PROCESS,
                        "failed to kill unidentified child: {e}"
                    );
                }
                return Err(std::io::Error::other("spawned child reported no process id"));
            };

            tracing::debug!(target: trace_categories::PROCESS, "created process {pid}");

            let exit = async move { child.wait().await.map(ExitStatus::from) }.boxed();
            Ok(SpawnedProcess { pid, exit })
        }
    } else {
        fn spawn_child(_command: std::process::Command) -> std::io::Result<SpawnedProcess> {
            tracing::debug!(target: trace_categories::PROCESS, "process creation unsupported");
            Err(std::io::Error::new(
                std::io::ErrorKind::Unsupported,
                "process creation is not supported on this platform",
            ))
        }
    }
}
