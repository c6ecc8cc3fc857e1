//! OS pipes and their registration with the tokio reactor.

use std::os::fd::OwnedFd;

pub use os_pipe::{PipeReader, PipeWriter};

/// Parent end of a child-writes pipe, registered with an event loop.
pub type AsyncPipeReader = Box<dyn tokio::io::AsyncRead + Send + Unpin>;

/// Parent end of a child-reads pipe, registered with an event loop.
pub type AsyncPipeWriter = Box<dyn tokio::io::AsyncWrite + Send + Unpin>;

pub(crate) fn pipe() -> std::io::Result<(PipeReader, PipeWriter)> {
    os_pipe::pipe()
}

/// Registers a read end with the reactor of the current runtime context.
pub(crate) fn register_reader(reader: PipeReader) -> std::io::Result<AsyncPipeReader> {
    let receiver = tokio::net::unix::pipe::Receiver::from_owned_fd(OwnedFd::from(reader))?;
    Ok(Box::new(receiver))
}

/// Registers a write end with the reactor of the current runtime context.
pub(crate) fn register_writer(writer: PipeWriter) -> std::io::Result<AsyncPipeWriter> {
    let sender = tokio::net::unix::pipe::Sender::from_owned_fd(OwnedFd::from(writer))?;
    Ok(Box::new(sender))
}
