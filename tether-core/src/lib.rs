//! Managed child processes with piped stdin and stdout, driven by an event loop.
//!
//! A [`ManagedProcess`] is configured through its public fields, spawned onto an
//! [`EventLoop`], fed through its [`stdin`](ManagedProcess::stdin) pipe, and
//! observed through callbacks or a [`ProcessEvent`] subscription.

mod error;
mod event_loop;
mod options;
mod pipes;
mod process;
mod process_events;
mod sys;
pub mod trace_categories;
mod utils;

pub use error::Error;
pub use event_loop::{EventLoop, ExitFuture, SpawnedProcess, TokioEventLoop};
pub use options::{DEFAULT_MAX_ARGS, ProcessOptions, STDIO_COUNT, StdioRedirect};
pub use pipes::{
    ChunkCallback, CloseCallback, Pipe, PipeDirection, PipeSender, READ_CHUNK_SIZE,
    WRITE_QUEUE_DEPTH,
};
pub use process::{ExitCallback, ExitStatus, ManagedProcess, OutputCallback, ProcessState};
pub use process_events::ProcessEvent;
pub use sys::pipes::{AsyncPipeReader, AsyncPipeWriter, PipeReader, PipeWriter};
pub use sys::process::ProcessId;
pub use sys::signal::{Signal, TERMINATE, parse_signal, signal_name, signal_number};
