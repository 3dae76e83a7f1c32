use std::io;

use thiserror::Error;

/// Failure decoding or encoding a wire frame.
///
/// I/O problems keep their [`io::Error`] source; every other variant means
/// the peer sent something this implementation refuses to act on. Either way
/// the operation in flight is abandoned; the framing has no resync points.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Reading or writing the underlying stream failed.
    #[error("stream i/o failed: {0}")]
    Io(#[from] io::Error),

    /// The header carried an operation tag this implementation does not know.
    #[error("unknown operation tag {0:#x}")]
    UnknownOpTag(u32),

    /// The header carried a file-kind value outside the known set.
    #[error("unknown file kind {0:#x}")]
    UnknownFileKind(u32),

    /// A path exceeded the wire limits.
    #[error("path of {len} bytes exceeds the wire limit")]
    PathTooLong {
        /// Observed path length in bytes.
        len: usize,
    },

    /// A path was not `./`-anchored or contained forbidden components.
    #[error("path {0:?} is not a clean ./-anchored relative path")]
    UnanchoredPath(String),

    /// A path frame was not NUL terminated where the header said it ends.
    #[error("path frame missing its terminator")]
    UnterminatedPath,

    /// A path frame contained bytes that are not valid UTF-8.
    #[error("path frame is not valid UTF-8")]
    PathEncoding,

    /// A digest frame did not contain 32 hex characters.
    #[error("digest frame is not 32 hex characters")]
    MalformedDigest,

    /// The 20-byte reply matched neither known sentinel.
    #[error("unrecognised peer reply")]
    UnknownReply,

    /// A chunk frame declared more payload than a frame can carry.
    #[error("chunk declares {len} payload bytes, limit is {max}")]
    OversizedChunk {
        /// Declared payload length.
        len: u32,
        /// Maximum payload a frame carries.
        max: usize,
    },
}
