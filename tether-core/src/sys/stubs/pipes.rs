//! Placeholder pipes for platforms without pipe support.

/// Read end of a pipe.
pub struct PipeReader {}

impl PipeReader {
    /// Duplicates the pipe end.
    pub fn try_clone(&self) -> std::io::Result<Self> {
        Ok(Self {})
    }
}

impl From<PipeReader> for std::process::Stdio {
    fn from(_reader: PipeReader) -> Self {
        Self::null()
    }
}

/// Write end of a pipe.
pub struct PipeWriter {}

impl PipeWriter {
    /// Duplicates the pipe end.
    pub fn try_clone(&self) -> std::io::Result<Self> {
        Ok(Self {})
    }
}

impl From<PipeWriter> for std::process::Stdio {
    fn from(_writer: PipeWriter) -> Self {
        Self::null()
    }
}

/// Parent end of a child-writes pipe, registered with an event loop.
pub type AsyncPipeReader = Box<dyn tokio::io::AsyncRead + Send + Unpin>;

/// Parent end of a child-reads pipe, registered with an event loop.
pub type AsyncPipeWriter = Box<dyn tokio::io::AsyncWrite + Send + Unpin>;

pub(crate) fn pipe() -> std::io::Result<(PipeReader, PipeWriter)> {
    Ok((PipeReader {}, PipeWriter {}))
}

pub(crate) fn register_reader(_reader: PipeReader) -> std::io::Result<AsyncPipeReader> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "async pipes are not supported on this platform",
    ))
}

pub(crate) fn register_writer(_writer: PipeWriter) -> std::io::Result<AsyncPipeWriter> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "async pipes are not supported on this platform",
    ))
}
