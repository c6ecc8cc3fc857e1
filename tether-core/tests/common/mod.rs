//! Shared helpers for process integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Context;
use futures::future::BoxFuture;
use tether_core::{
    AsyncPipeReader, AsyncPipeWriter, EventLoop, PipeReader, PipeWriter, ProcessEvent, ProcessId,
    Signal, SpawnedProcess, TokioEventLoop,
};
use tokio::sync::mpsc::UnboundedReceiver;

/// How long any single test waits for a child before giving up.
pub const TIMEOUT: Duration = Duration::from_secs(10);

/// A tokio-backed loop that records what it is asked to do.
pub struct RecordingLoop {
    inner: TokioEventLoop,
    creations: AtomicUsize,
    signals: Mutex<Vec<(ProcessId, Signal)>>,
    refuse_readers: AtomicBool,
    refuse_writers: AtomicBool,
}

impl RecordingLoop {
    pub fn current() -> anyhow::Result<Arc<Self>> {
        Ok(Arc::new(Self {
            inner: TokioEventLoop::current()?,
            creations: AtomicUsize::new(0),
            signals: Mutex::new(Vec::new()),
            refuse_readers: AtomicBool::new(false),
            refuse_writers: AtomicBool::new(false),
        }))
    }

    pub fn creations(&self) -> usize {
        self.creations.load(Ordering::SeqCst)
    }

    pub fn signals(&self) -> Vec<(ProcessId, Signal)> {
        self.signals.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Makes subsequent reader registrations fail.
    pub fn refuse_readers(&self) {
        self.refuse_readers.store(true, Ordering::SeqCst);
    }

    /// Lets subsequent reader registrations through again.
    pub fn allow_readers(&self) {
        self.refuse_readers.store(false, Ordering::SeqCst);
    }

    /// Makes subsequent writer registrations fail.
    pub fn refuse_writers(&self) {
        self.refuse_writers.store(true, Ordering::SeqCst);
    }
}

impl EventLoop for RecordingLoop {
    fn create_process(&self, command: std::process::Command) -> std::io::Result<SpawnedProcess> {
        self.creations.fetch_add(1, Ordering::SeqCst);
        self.inner.create_process(command)
    }

    fn register_reader(&self, reader: PipeReader) -> std::io::Result<AsyncPipeReader> {
        if self.refuse_readers.load(Ordering::SeqCst) {
            return Err(std::io::Error::from_raw_os_error(24));
        }
        self.inner.register_reader(reader)
    }

    fn register_writer(&self, writer: PipeWriter) -> std::io::Result<AsyncPipeWriter> {
        if self.refuse_writers.load(Ordering::SeqCst) {
            return Err(std::io::Error::from_raw_os_error(24));
        }
        self.inner.register_writer(writer)
    }

    fn send_signal(&self, pid: ProcessId, signal: Signal) -> Result<(), tether_core::Error> {
        if let Ok(mut signals) = self.signals.lock() {
            signals.push((pid, signal));
        }
        self.inner.send_signal(pid, signal)
    }

    fn schedule(&self, task: BoxFuture<'static, ()>) {
        self.inner.schedule(task);
    }
}

/// Everything observed from a process until both its exit and the end of its stdout.
#[derive(Debug, Default)]
pub struct Completion {
    pub events: Vec<ProcessEvent>,
    pub output: Vec<u8>,
    pub exit_code: Option<i64>,
    pub signal: Option<i32>,
}

impl Completion {
    pub fn output_str(&self) -> String {
        String::from_utf8_lossy(&self.output).into_owned()
    }
}

/// Drains events until the process has exited and its stdout has closed.
pub async fn complete(mut events: UnboundedReceiver<ProcessEvent>) -> anyhow::Result<Completion> {
    tokio::time::timeout(TIMEOUT, async move {
        let mut completion = Completion::default();
        let mut stdout_closed = false;

        while completion.exit_code.is_none() || !stdout_closed {
            let event = events.recv().await.context("event stream ended early")?;
            match &event {
                ProcessEvent::Output { data, .. } => completion.output.extend_from_slice(data),
                ProcessEvent::StdoutClosed { .. } => stdout_closed = true,
                ProcessEvent::Exited {
                    exit_code, signal, ..
                } => {
                    completion.exit_code = Some(*exit_code);
                    completion.signal = *signal;
                }
                ProcessEvent::Spawned { .. } => (),
            }
            completion.events.push(event);
        }

        anyhow::Ok(completion)
    })
    .await
    .context("timed out waiting for process")?
}

/// Waits only for the exit event.
pub async fn exited(
    events: &mut UnboundedReceiver<ProcessEvent>,
) -> anyhow::Result<(i64, Option<i32>)> {
    tokio::time::timeout(TIMEOUT, async {
        loop {
            if let ProcessEvent::Exited {
                exit_code, signal, ..
            } = events.recv().await.context("event stream ended early")?
            {
                return anyhow::Ok((exit_code, signal));
            }
        }
    })
    .await
    .context("timed out waiting for exit")?
}
