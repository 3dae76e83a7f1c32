#![deny(unsafe_code)]
#![deny(missing_docs)]

//! # Overview
//!
//! Wire framing shared by the replicator client and server. One logical file
//! operation travels as a fixed-size [`OpHeader`] followed by a variable tail
//! whose layout the header determines:
//!
//! 1. Header (14 bytes, little-endian fields).
//! 2. Current relative path, NUL terminated (`rel_path_len + 1` bytes).
//! 3. For symlink creates: the resolved target path, NUL terminated.
//! 4. For moves: the old relative path, NUL terminated.
//! 5. For modifies: a 33-byte digest frame, then a 20-byte textual reply
//!    from the peer, then (only when the peer does not already hold the
//!    content) a big-endian `u32` size hint followed by fixed 1032-byte
//!    chunk frames until a frame with the EOF flag set.
//!
//! # Design
//!
//! - Every frame here has a fixed size or a size fully determined by the
//!   header, so the stream never needs resynchronisation markers.
//! - Integer fields are explicitly little-endian except the file-size hint,
//!   which stays in network byte order; both ends convert on the boundary and
//!   compare in host order.
//! - Paths are UTF-8, anchored at the replicated root with a `./` prefix, and
//!   validated on both send and receive: length bounds, the anchor prefix,
//!   and the absence of `..` components are checked before a path is allowed
//!   to touch a file system.
//!
//! # Errors
//!
//! All decoding problems surface as [`ProtocolError`]. Short reads are I/O
//! errors (`UnexpectedEof`) and mean the stream is no longer aligned; callers
//! abandon the current operation.

mod error;
mod frames;
mod header;

pub use error::ProtocolError;
pub use frames::{
    read_chunk, read_digest, read_file_size, read_path, read_reply, write_chunk, write_digest,
    write_file_size, write_path, write_reply, Chunk, Reply, CHUNK_DATA_LEN, CHUNK_FRAME_LEN,
    DIGEST_FRAME_LEN, REPLY_LEN,
};
pub use header::{FileKind, OpHeader, OpTag, HEADER_LEN};

/// Longest relative path accepted on the wire, terminator excluded.
pub const MAX_PATH_LEN: usize = 4096;

/// Longest single path component accepted on the wire.
pub const MAX_NAME_LEN: usize = 255;

/// Validates a `./`-anchored relative path for wire use.
///
/// Checked here once and reused by senders and receivers: non-empty, within
/// [`MAX_PATH_LEN`], anchored with `./`, free of NUL bytes, free of empty and
/// `.`/`..` components after the anchor. The bare anchor `.` is allowed
/// because a symlink may resolve to the replicated root itself.
pub fn validate_rel_path(path: &str) -> Result<(), ProtocolError> {
    if path == "." {
        return Ok(());
    }
    if path.len() < 3 || !path.starts_with("./") {
        return Err(ProtocolError::UnanchoredPath(path.to_owned()));
    }
    if path.len() > MAX_PATH_LEN {
        return Err(ProtocolError::PathTooLong { len: path.len() });
    }
    if path.as_bytes().contains(&0) {
        return Err(ProtocolError::UnanchoredPath(path.to_owned()));
    }
    for component in path[2..].split('/') {
        if component.is_empty() || component == "." || component == ".." {
            return Err(ProtocolError::UnanchoredPath(path.to_owned()));
        }
        if component.len() > MAX_NAME_LEN {
            return Err(ProtocolError::PathTooLong { len: path.len() });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_anchored_paths() {
        validate_rel_path("./a").expect("short");
        validate_rel_path("./a/b.txt").expect("nested");
        validate_rel_path("./.hidden").expect("dot file");
        validate_rel_path("./..double").expect("leading dots in a name");
        validate_rel_path(".").expect("the root anchor itself");
    }

    #[test]
    fn rejects_unanchored_and_traversing_paths() {
        assert!(validate_rel_path("").is_err());
        assert!(validate_rel_path("./").is_err());
        assert!(validate_rel_path("a/b").is_err());
        assert!(validate_rel_path("/etc/passwd").is_err());
        assert!(validate_rel_path("./a//b").is_err());
        assert!(validate_rel_path("./a/./b").is_err());
        assert!(validate_rel_path("./a/../b").is_err());
        assert!(validate_rel_path("./..").is_err());
    }

    #[test]
    fn rejects_oversized_paths() {
        let long = format!("./{}", "a".repeat(MAX_PATH_LEN));
        assert!(matches!(
            validate_rel_path(&long),
            Err(ProtocolError::PathTooLong { .. })
        ));
        let long_name = format!("./{}", "a".repeat(MAX_NAME_LEN + 1));
        assert!(matches!(
            validate_rel_path(&long_name),
            Err(ProtocolError::PathTooLong { .. })
        ));
    }
}
