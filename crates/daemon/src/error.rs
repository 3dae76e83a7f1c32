use std::io;

use thiserror::Error;

/// Failure on the server side.
#[derive(Debug, Error)]
pub enum DaemonError {
    /// A wire frame could not be decoded, or the stream broke mid-frame.
    #[error(transparent)]
    Protocol(#[from] protocol::ProtocolError),

    /// Filesystem or socket I/O failed while applying an operation.
    #[error("i/o failure: {0}")]
    Io(#[from] io::Error),

    /// The peer sent an operation the applier has no behaviour for.
    #[error("peer sent unsupported operation {0:?}")]
    Unsupported(protocol::OpTag),
}

impl DaemonError {
    /// Whether the connection is unusable after this error.
    ///
    /// Frame boundaries carry no resync markers: transport failures, and
    /// headers whose tail layout cannot be known, leave the stream decoding
    /// garbage. A fully read but invalid frame (a bad path, a malformed
    /// digest) keeps the stream aligned and only costs that operation.
    #[must_use]
    pub fn is_connection_fatal(&self) -> bool {
        use protocol::ProtocolError;
        match self {
            Self::Io(_) => true,
            Self::Protocol(
                ProtocolError::Io(_)
                | ProtocolError::UnknownOpTag(_)
                | ProtocolError::UnknownFileKind(_),
            ) => true,
            Self::Protocol(_) | Self::Unsupported(_) => false,
        }
    }
}
