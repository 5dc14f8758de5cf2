use thiserror::Error;

/// Errors from the wire-framing boundary.
#[derive(Debug, Error)]
pub enum FrameError {
    /// The peer closed the connection before a full 5-byte header (or the
    /// payload it announced) could be read.
    #[error("connection closed while reading a frame")]
    Eof,
    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors surfaced by a [`crate::session::Session`]'s read/write loop.
///
/// None of these are fatal to the broker process: the caller logs them and
/// tears the connection down.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error("write side of the connection closed")]
    WriterClosed,
}
