//! Byte-stream pipes connecting a managed process to its parent.

use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;

use crate::event_loop::EventLoop;
use crate::options::StdioRedirect;
use crate::utils::lock;
use crate::{error, sys, trace_categories};

/// Largest chunk handed to a read callback in one call.
pub const READ_CHUNK_SIZE: usize = 64 * 1024;

/// Number of chunks a child-reads pipe holds before further writes must wait.
pub const WRITE_QUEUE_DEPTH: usize = 64;

/// Callback receiving each chunk of bytes read from a pipe.
pub type ChunkCallback = Box<dyn FnMut(&[u8]) + Send>;

/// Callback invoked once when a pipe's read stream ends.
pub type CloseCallback = Box<dyn FnOnce() + Send>;

/// Which way bytes flow through a pipe, seen from the child.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PipeDirection {
    /// The child reads; the parent writes (child stdin).
    ChildReads,
    /// The child writes; the parent reads (child stdout).
    ChildWrites,
}

enum Ends {
    ChildReads {
        child: Option<sys::pipes::PipeReader>,
        parent: Option<sys::pipes::PipeWriter>,
    },
    ChildWrites {
        child: Option<sys::pipes::PipeWriter>,
        parent: Option<sys::pipes::PipeReader>,
    },
}

/// One OS pipe shared between a managed process and its parent.
///
/// The child's end is handed to the child at spawn time; the parent's end is
/// registered with the event loop, either to deliver chunks to a callback
/// ([`Pipe::read_start`]) or to drain bytes queued with [`Pipe::write`].
pub struct Pipe {
    direction: PipeDirection,
    ends: Mutex<Ends>,
    outgoing: Mutex<Option<mpsc::Sender<Vec<u8>>>>,
    queued: Mutex<Option<mpsc::Receiver<Vec<u8>>>>,
    reading: Arc<AtomicBool>,
}

impl Pipe {
    /// Creates the OS pipe.
    ///
    /// # Arguments
    ///
    /// * `direction` - Which way bytes will flow, seen from the child.
    pub fn new(direction: PipeDirection) -> Result<Self, error::Error> {
        let (reader, writer) = sys::pipes::pipe()?;

        let (ends, outgoing, queued) = match direction {
            PipeDirection::ChildReads => {
                let (sender, receiver) = mpsc::channel(WRITE_QUEUE_DEPTH);
                let ends = Ends::ChildReads {
                    child: Some(reader),
                    parent: Some(writer),
                };
                (ends, Some(sender), Some(receiver))
            }
            PipeDirection::ChildWrites => {
                let ends = Ends::ChildWrites {
                    child: Some(writer),
                    parent: Some(reader),
                };
                (ends, None, None)
            }
        };

        Ok(Self {
            direction,
            ends: Mutex::new(ends),
            outgoing: Mutex::new(outgoing),
            queued: Mutex::new(queued),
            reading: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Returns the direction of the pipe.
    pub const fn direction(&self) -> PipeDirection {
        self.direction
    }

    /// Returns whether the child's end is still available to hand to a new process.
    pub fn is_ready(&self) -> bool {
        match &*lock(&self.ends) {
            Ends::ChildReads { child, .. } => child.is_some(),
            Ends::ChildWrites { child, .. } => child.is_some(),
        }
    }

    /// Returns whether a read loop is currently delivering chunks.
    pub fn is_reading(&self) -> bool {
        self.reading.load(Ordering::Acquire)
    }

    /// Queues bytes for the child to read without waiting.
    ///
    /// Bytes written before the child is spawned are held until the write side is
    /// registered with the event loop; they are then delivered in order. At most
    /// [`WRITE_QUEUE_DEPTH`] chunks are held; beyond that this fails with
    /// [`error::Error::PipeFull`] and [`Pipe::send`] waits for room instead.
    pub fn write(&self, data: impl Into<Vec<u8>>) -> Result<(), error::Error> {
        self.sender()?
            .0
            .try_send(data.into())
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => error::Error::PipeFull,
                mpsc::error::TrySendError::Closed(_) => error::Error::PipeClosed,
            })
    }

    /// Queues bytes for the child to read, waiting while the queue is full.
    pub async fn send(&self, data: impl Into<Vec<u8>>) -> Result<(), error::Error> {
        self.sender()?.send(data).await
    }

    /// Returns a handle that queues bytes independently of this pipe.
    ///
    /// The child observes end-of-file only once [`Pipe::close`] was called and
    /// every handle has been dropped.
    pub fn sender(&self) -> Result<PipeSender, error::Error> {
        if self.direction != PipeDirection::ChildReads {
            return Err(error::Error::WrongPipeDirection);
        }

        lock(&self.outgoing)
            .clone()
            .map(PipeSender)
            .ok_or(error::Error::PipeClosed)
    }

    /// Stops accepting writes. The child observes end-of-file once everything
    /// already queued has been written. On a child-writes pipe that is not being
    /// read, the parent's read end is released.
    pub fn close(&self) {
        match self.direction {
            PipeDirection::ChildReads => {
                lock(&self.outgoing).take();
            }
            PipeDirection::ChildWrites => {
                if let Ends::ChildWrites { parent, .. } = &mut *lock(&self.ends) {
                    parent.take();
                }
            }
        }
    }

    /// Starts delivering chunks read from the child to `on_chunk`.
    ///
    /// # Arguments
    ///
    /// * `event_loop` - Loop that registers the read end and runs the read task.
    /// * `on_chunk` - Invoked once per chunk, in the order the bytes arrived.
    pub fn read_start(
        &self,
        event_loop: &dyn EventLoop,
        on_chunk: ChunkCallback,
    ) -> Result<(), error::Error> {
        self.read_start_with_close(event_loop, on_chunk, Box::new(|| ()))
    }

    /// Like [`Pipe::read_start`], additionally invoking `on_close` when the stream
    /// ends.
    pub fn read_start_with_close(
        &self,
        event_loop: &dyn EventLoop,
        on_chunk: ChunkCallback,
        on_close: CloseCallback,
    ) -> Result<(), error::Error> {
        if self.direction != PipeDirection::ChildWrites {
            return Err(error::Error::WrongPipeDirection);
        }
        if self.is_reading() {
            return Err(error::Error::PipeAlreadyReading);
        }

        let reader = {
            let mut ends = lock(&self.ends);
            let Ends::ChildWrites { parent, .. } = &mut *ends else {
                return Err(error::Error::PipeUnavailable);
            };
            let source = parent.as_ref().ok_or(error::Error::PipeUnavailable)?;

            // Register a duplicate; the original stays in place if registration fails.
            let reader = event_loop.register_reader(source.try_clone()?)?;
            parent.take();
            reader
        };

        self.reading.store(true, Ordering::Release);
        event_loop.schedule(Box::pin(pump_reads(
            reader,
            on_chunk,
            on_close,
            Arc::clone(&self.reading),
        )));

        Ok(())
    }

    /// Registers the write end with the event loop and starts draining queued
    /// writes into it.
    pub(crate) fn start_writing(&self, event_loop: &dyn EventLoop) -> Result<(), error::Error> {
        if self.direction != PipeDirection::ChildReads {
            return Err(error::Error::WrongPipeDirection);
        }

        let mut queued = lock(&self.queued);
        if queued.is_none() {
            return Err(error::Error::PipeUnavailable);
        }

        let writer = {
            let mut ends = lock(&self.ends);
            let Ends::ChildReads { parent, .. } = &mut *ends else {
                return Err(error::Error::PipeUnavailable);
            };
            let source = parent.as_ref().ok_or(error::Error::PipeUnavailable)?;

            let writer = event_loop.register_writer(source.try_clone()?)?;
            // Only the registered duplicate may hold the write end, or the child never sees EOF.
            parent.take();
            writer
        };

        let queued = queued.take().ok_or(error::Error::PipeUnavailable)?;
        event_loop.schedule(Box::pin(drain_writes(writer, queued)));

        Ok(())
    }

    /// Produces a duplicate of the child's end suitable for the given stdio slot.
    pub(crate) fn child_stdio(&self, redirect: StdioRedirect) -> Result<Stdio, error::Error> {
        let ends = lock(&self.ends);
        match (redirect, &*ends) {
            (StdioRedirect::Ignore, _) => Ok(Stdio::null()),
            (StdioRedirect::ReadablePipe, Ends::ChildReads { child, .. }) => {
                let child = child.as_ref().ok_or(error::Error::PipeUnavailable)?;
                Ok(child.try_clone()?.into())
            }
            (StdioRedirect::WritablePipe, Ends::ChildWrites { child, .. }) => {
                let child = child.as_ref().ok_or(error::Error::PipeUnavailable)?;
                Ok(child.try_clone()?.into())
            }
            _ => Err(error::Error::WrongPipeDirection),
        }
    }

    /// Drops the parent's copy of the child's end once a child holds it, so that
    /// end-of-file propagates when the child exits.
    pub(crate) fn release_child_end(&self) {
        match &mut *lock(&self.ends) {
            Ends::ChildReads { child, .. } => {
                child.take();
            }
            Ends::ChildWrites { child, .. } => {
                child.take();
            }
        }
    }
}

/// Cloneable handle queueing bytes into a child-reads [`Pipe`].
#[derive(Clone, Debug)]
pub struct PipeSender(mpsc::Sender<Vec<u8>>);

impl PipeSender {
    /// Queues bytes for the child to read, waiting while the queue is full.
    pub async fn send(&self, data: impl Into<Vec<u8>>) -> Result<(), error::Error> {
        self.0
            .send(data.into())
            .await
            .map_err(|_closed| error::Error::PipeClosed)
    }
}

async fn pump_reads(
    mut reader: sys::pipes::AsyncPipeReader,
    mut on_chunk: ChunkCallback,
    on_close: CloseCallback,
    reading: Arc<AtomicBool>,
) {
    let mut buffer = vec![0u8; READ_CHUNK_SIZE];

    loop {
        match reader.read(&mut buffer).await {
            Ok(0) => {
                tracing::trace!(target: trace_categories::PIPES, "pipe reached end-of-file");
                break;
            }
            Ok(count) => {
                tracing::trace!(target: trace_categories::PIPES, "read {count} byte(s) from pipe");
                on_chunk(&buffer[..count]);
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => (),
            Err(e) => {
                tracing::debug!(target: trace_categories::PIPES, "pipe read failed: {e}");
                break;
            }
        }
    }

    reading.store(false, Ordering::Release);
    on_close();
}

async fn drain_writes(
    mut writer: sys::pipes::AsyncPipeWriter,
    mut queued: mpsc::Receiver<Vec<u8>>,
) {
    while let Some(data) = queued.recv().await {
        if let Err(e) = writer.write_all(&data).await {
            tracing::debug!(target: trace_categories::PIPES, "pipe write failed: {e}");
            // Later writes fail fast with `PipeClosed` instead of queueing forever.
            queued.close();
            return;
        }
        tracing::trace!(target: trace_categories::PIPES, "wrote {} byte(s) to pipe", data.len());
    }

    if let Err(e) = writer.shutdown().await {
        tracing::debug!(target: trace_categories::PIPES, "pipe shutdown failed: {e}");
    }
}
