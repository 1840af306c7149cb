use minirpc::{CodecError, HandshakeError};
use std::io;
use std::sync::Arc;
use thiserror::Error;

/// Errors a [`Call`](crate::Call) can complete with.
///
/// `Clone` because a connection failure is handed to every pending call.
#[derive(Debug, Clone, Error)]
pub enum RpcError {
    /// The client was closed, or its connection already terminated, before
    /// the call could be sent.
    #[error("connection is shut down")]
    Shutdown,

    /// The server answered with an error. Displays the server's message
    /// verbatim.
    #[error("{0}")]
    Remote(String),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Handshake(#[from] HandshakeError),

    #[error("rpc client: unsupported network {0}")]
    UnsupportedNetwork(String),

    #[error("rpc client: {0}")]
    Io(Arc<io::Error>),
}

impl From<io::Error> for RpcError {
    fn from(err: io::Error) -> Self {
        RpcError::Io(Arc::new(err))
    }
}
