use std::io;

use thiserror::Error;

/// Failure in the client core.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The watch layer failed (kernel handle, watch table, poll).
    #[error(transparent)]
    Watch(#[from] watch::WatchError),

    /// Encoding or decoding a wire frame failed, or the peer misbehaved.
    #[error(transparent)]
    Protocol(#[from] protocol::ProtocolError),

    /// Local filesystem or socket I/O failed outside the protocol layer.
    #[error("i/o failure: {0}")]
    Io(#[from] io::Error),
}
