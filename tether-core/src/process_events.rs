//! Emits notifications about a managed process.

use serde::Serialize;
use std::path::PathBuf;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};

use crate::sys;

/// Describes something that happened to a managed process.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub enum ProcessEvent {
    /// A process was spawned.
    Spawned {
        /// Process identifier of the spawned child.
        pid: sys::process::ProcessId,
        /// Path of the executable that was started.
        program: PathBuf,
        /// Argument vector passed to the child, starting with `argv[0]`.
        args: Vec<String>,
        /// Working directory requested for the child, if any.
        cwd: Option<PathBuf>,
    },
    /// A chunk of bytes arrived on the child's stdout.
    Output {
        /// Process identifier.
        pid: sys::process::ProcessId,
        /// The raw bytes, exactly as read from the pipe.
        data: Vec<u8>,
    },
    /// The child's stdout reached end-of-file (or failed).
    StdoutClosed {
        /// Process identifier.
        pid: sys::process::ProcessId,
    },
    /// A process exited.
    Exited {
        /// Process identifier.
        pid: sys::process::ProcessId,
        /// Exit code reported for the process.
        exit_code: i64,
        /// Signal that terminated the process, if any.
        signal: Option<i32>,
    },
}

/// The set of channels listening to one process.
#[derive(Default)]
pub(crate) struct Subscribers {
    senders: Vec<UnboundedSender<ProcessEvent>>,
}

impl Subscribers {
    pub fn subscribe(&mut self) -> UnboundedReceiver<ProcessEvent> {
        let (sender, receiver) = unbounded_channel();
        self.senders.push(sender);
        receiver
    }

    pub fn is_empty(&self) -> bool {
        self.senders.is_empty()
    }

    /// Sends the event to every subscriber, forgetting those that hung up.
    pub fn emit(&mut self, event: &ProcessEvent) {
        self.senders
            .retain(|sender| sender.send(event.clone()).is_ok());
    }
}
