#![deny(unsafe_code)]
#![deny(missing_docs)]

//! Content digests for transfer deduplication.
//!
//! The server keeps an index from content digest to an on-disk path so a
//! MODIFY whose payload is already present can be satisfied with a local copy
//! instead of a network transfer. The digest is MD5: 128 bits, rendered as 32
//! lowercase hex characters on the wire. MD5 is not collision resistant, and
//! does not need to be here: a collision costs one wrong local copy on a
//! mirror the client will simply overwrite on the next change, and the index
//! is rebuilt from disk on every server start.
//!
//! Hashing is performed in-process with a streaming hasher; file contents are
//! read through a fixed buffer so arbitrarily large files hash in constant
//! memory.

use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use digest::Digest;
use md5::Md5;

/// Number of hex characters in a rendered digest.
pub const DIGEST_HEX_LEN: usize = 32;

/// Read buffer used when hashing streams.
const HASH_BUF_LEN: usize = 64 * 1024;

/// A 128-bit content digest.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Md5Digest([u8; 16]);

impl Md5Digest {
    /// Wraps a raw 16-byte digest value.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Returns the raw digest bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Parses the 32-hex-character wire rendering.
    ///
    /// Returns `None` when the input has the wrong length or contains a
    /// non-hex byte. Uppercase input is accepted.
    #[must_use]
    pub fn parse_hex(text: &str) -> Option<Self> {
        if text.len() != DIGEST_HEX_LEN {
            return None;
        }
        let mut bytes = [0u8; 16];
        for (i, chunk) in text.as_bytes().chunks_exact(2).enumerate() {
            let hi = (chunk[0] as char).to_digit(16)?;
            let lo = (chunk[1] as char).to_digit(16)?;
            bytes[i] = ((hi << 4) | lo) as u8;
        }
        Some(Self(bytes))
    }
}

impl fmt::Display for Md5Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Md5Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Md5Digest({self})")
    }
}

/// Streaming digest state.
///
/// # Examples
///
/// ```
/// use checksums::Hasher;
///
/// let mut hasher = Hasher::new();
/// hasher.update(b"abc");
/// assert_eq!(
///     hasher.finalize().to_string(),
///     "900150983cd24fb0d6963f7d28e17f72",
/// );
/// ```
#[derive(Clone, Default)]
pub struct Hasher {
    inner: Md5,
}

impl Hasher {
    /// Creates a hasher with an empty state.
    #[must_use]
    pub fn new() -> Self {
        Self { inner: Md5::new() }
    }

    /// Feeds `data` into the hash state.
    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
    }

    /// Consumes the state and returns the digest.
    #[must_use]
    pub fn finalize(self) -> Md5Digest {
        Md5Digest(self.inner.finalize().into())
    }
}

/// Hashes everything readable from `reader`.
///
/// Returns the digest together with the number of bytes consumed.
pub fn hash_reader<R: Read>(mut reader: R) -> io::Result<(Md5Digest, u64)> {
    let mut hasher = Hasher::new();
    let mut buf = [0u8; HASH_BUF_LEN];
    let mut total = 0u64;
    loop {
        let read = reader.read(&mut buf)?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
        total += read as u64;
    }
    Ok((hasher.finalize(), total))
}

/// Hashes the contents of the file at `path`.
///
/// Symbolic links are followed; hashing a link digests its target's content,
/// which matches how link-shaped paths behave everywhere else in a transfer.
pub fn hash_file<P: AsRef<Path>>(path: P) -> io::Result<(Md5Digest, u64)> {
    hash_reader(File::open(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn empty_input_digest() {
        assert_eq!(
            Hasher::new().finalize().to_string(),
            "d41d8cd98f00b204e9800998ecf8427e",
        );
    }

    #[test]
    fn known_vector() {
        let mut hasher = Hasher::new();
        hasher.update(b"hello\n");
        assert_eq!(
            hasher.finalize().to_string(),
            "b1946ac92492d2347c6235b4d2611184",
        );
    }

    #[test]
    fn incremental_updates_match_single_shot() {
        let mut split = Hasher::new();
        split.update(b"he");
        split.update(b"llo\n");
        let mut whole = Hasher::new();
        whole.update(b"hello\n");
        assert_eq!(split.finalize(), whole.finalize());
    }

    #[test]
    fn hex_round_trip() {
        let mut hasher = Hasher::new();
        hasher.update(b"round trip");
        let digest = hasher.finalize();
        let parsed = Md5Digest::parse_hex(&digest.to_string()).expect("parse own rendering");
        assert_eq!(parsed, digest);
    }

    #[test]
    fn parse_hex_rejects_bad_input() {
        assert!(Md5Digest::parse_hex("").is_none());
        assert!(Md5Digest::parse_hex("abc").is_none());
        assert!(Md5Digest::parse_hex(&"g".repeat(32)).is_none());
        assert!(Md5Digest::parse_hex(&"ab".repeat(17)).is_none());
    }

    #[test]
    fn parse_hex_accepts_uppercase() {
        let digest = Md5Digest::parse_hex("D41D8CD98F00B204E9800998ECF8427E").expect("uppercase");
        assert_eq!(digest.to_string(), "d41d8cd98f00b204e9800998ecf8427e");
    }

    #[test]
    fn hash_file_streams_large_content() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("large.bin");
        let content = vec![0xa5u8; 3 * HASH_BUF_LEN + 17];
        fs::write(&path, &content).expect("write");

        let (digest, size) = hash_file(&path).expect("hash file");
        let (expected, _) = hash_reader(&content[..]).expect("hash slice");
        assert_eq!(size, content.len() as u64);
        assert_eq!(digest, expected);
    }
}
