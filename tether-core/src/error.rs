use std::path::PathBuf;

use crate::sys;

/// Monolithic error type for managed processes and their pipes.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// More arguments were supplied than the configured limit allows.
    #[error("cannot spawn process: {count} arguments supplied, at most {max} are supported")]
    TooManyArguments {
        /// Number of arguments supplied.
        count: usize,
        /// Configured maximum.
        max: usize,
    },

    /// Neither an executable path nor a first argument was provided.
    #[error("cannot spawn process: no executable path or arguments given")]
    MissingExecutable,

    /// The operating system rejected creation of the child process.
    #[error("cannot spawn process {}: {source}", executable.display())]
    SpawnFailed {
        /// The executable that was requested.
        executable: PathBuf,
        /// The underlying OS error.
        #[source]
        source: std::io::Error,
    },

    /// The child was created but reading from its stdout could not be started.
    #[error("cannot read stdout pipe: {0}")]
    ReadStartFailed(#[source] Box<Error>),

    /// The child was created but writing to its stdin could not be started.
    #[error("cannot write stdin pipe: {0}")]
    WriteStartFailed(#[source] Box<Error>),

    /// A signal was requested but no process is running.
    #[error("no running process to signal")]
    InvalidKillTarget,

    /// The operating system refused to deliver a signal.
    #[error("failed to send signal {signal} to process {pid}: {source}")]
    FailedToSendSignal {
        /// Target process.
        pid: sys::process::ProcessId,
        /// Name of the signal.
        signal: String,
        /// The underlying OS error.
        #[source]
        source: std::io::Error,
    },

    /// The instance already spawned a process; re-spawning is not supported.
    #[error("process was already spawned")]
    AlreadySpawned,

    /// The pipe no longer accepts writes.
    #[error("pipe is closed")]
    PipeClosed,

    /// The pipe's write queue is full; the child has not caught up yet.
    #[error("pipe write queue is full")]
    PipeFull,

    /// The requested operation does not match the direction of the pipe.
    #[error("operation not supported for this pipe direction")]
    WrongPipeDirection,

    /// Reading was already started on the pipe.
    #[error("pipe is already being read")]
    PipeAlreadyReading,

    /// The OS end of the pipe needed for the operation has already been handed off.
    #[error("pipe endpoint is no longer available")]
    PipeUnavailable,

    /// An invalid signal was referenced.
    #[error("{0}: invalid signal specification")]
    InvalidSignal(String),

    /// No event loop is available in the current context.
    #[error("no event loop is running in this context")]
    NoEventLoop,

    /// The requested functionality is not available on this platform.
    #[error("not supported on this platform: {0}")]
    NotSupportedOnThisPlatform(&'static str),

    /// An I/O error occurred.
    #[error("i/o error: {0}")]
    IoError(#[from] std::io::Error),
}

impl Error {
    /// Returns the raw OS error code underlying this error, if there is one.
    pub fn os_code(&self) -> Option<i32> {
        match self {
            Self::SpawnFailed { source, .. } | Self::FailedToSendSignal { source, .. } => {
                source.raw_os_error()
            }
            Self::IoError(e) => e.raw_os_error(),
            Self::ReadStartFailed(inner) | Self::WriteStartFailed(inner) => inner.os_code(),
            _ => None,
        }
    }

    /// Returns whether the error left a child process running behind it.
    pub const fn is_partial_spawn(&self) -> bool {
        matches!(self, Self::ReadStartFailed(_) | Self::WriteStartFailed(_))
    }
}
