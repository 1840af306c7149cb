use std::io;
use std::sync::Arc;
use thiserror::Error;

/// Errors produced while reading or writing frames through a codec.
///
/// The type is `Clone` so a single connection failure can be handed to every
/// outstanding call on that connection.
#[derive(Debug, Clone, Error)]
pub enum CodecError {
    /// The stream ended before a complete frame could be read.
    #[error("connection closed by peer")]
    Closed,

    /// The underlying stream failed.
    #[error("i/o error: {0}")]
    Io(Arc<io::Error>),

    /// A frame announced a length beyond `MAX_FRAME_SIZE`.
    #[error("frame size {size} exceeds maximum {max}")]
    FrameTooLarge { size: usize, max: usize },

    /// A header frame could not be decoded; the stream can no longer be trusted.
    #[error("malformed header: {0}")]
    MalformedHeader(String),

    /// A value could not be serialized.
    #[error("failed to encode: {0}")]
    Encode(String),

    /// A well-framed body did not decode into the requested type.
    #[error("failed to decode body: {0}")]
    Decode(String),

    /// The writer was already closed.
    #[error("codec is closed")]
    WriteAfterClose,
}

impl CodecError {
    /// Whether the error leaves the stream unusable.
    ///
    /// Only [`CodecError::Decode`] and [`CodecError::Encode`] are scoped to a
    /// single message; everything else ends the connection.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, CodecError::Decode(_) | CodecError::Encode(_))
    }
}

impl From<io::Error> for CodecError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::UnexpectedEof => CodecError::Closed,
            _ => CodecError::Io(Arc::new(err)),
        }
    }
}
