use std::io::{Read, Write};

use checksums::{Md5Digest, DIGEST_HEX_LEN};

use crate::error::ProtocolError;
use crate::{validate_rel_path, MAX_PATH_LEN};

/// Payload bytes carried by one chunk frame.
pub const CHUNK_DATA_LEN: usize = 1024;

/// Encoded size of a chunk frame: eof flag, payload length, payload.
pub const CHUNK_FRAME_LEN: usize = 8 + CHUNK_DATA_LEN;

/// Encoded size of a digest frame: 32 hex characters plus terminator.
pub const DIGEST_FRAME_LEN: usize = DIGEST_HEX_LEN + 1;

/// Encoded size of a textual reply frame.
pub const REPLY_LEN: usize = 20;

/// Writes a `./`-anchored path with its NUL terminator.
///
/// The caller has already placed the path length in the operation header;
/// this frame is the `len + 1` bytes the header announced.
pub fn write_path<W: Write>(writer: &mut W, path: &str) -> Result<(), ProtocolError> {
    validate_rel_path(path)?;
    writer.write_all(path.as_bytes())?;
    writer.write_all(&[0])?;
    Ok(())
}

/// Reads a path frame whose length the operation header announced.
pub fn read_path<R: Read>(reader: &mut R, declared_len: u16) -> Result<String, ProtocolError> {
    let declared_len = usize::from(declared_len);
    if declared_len > MAX_PATH_LEN {
        return Err(ProtocolError::PathTooLong { len: declared_len });
    }
    let mut bytes = vec![0u8; declared_len + 1];
    reader.read_exact(&mut bytes)?;
    if bytes.pop() != Some(0) {
        return Err(ProtocolError::UnterminatedPath);
    }
    let path = String::from_utf8(bytes).map_err(|_| ProtocolError::PathEncoding)?;
    validate_rel_path(&path)?;
    Ok(path)
}

/// Writes the 33-byte digest frame for a modify dialogue.
pub fn write_digest<W: Write>(writer: &mut W, digest: &Md5Digest) -> Result<(), ProtocolError> {
    writer.write_all(digest.to_string().as_bytes())?;
    writer.write_all(&[0])?;
    Ok(())
}

/// Reads the 33-byte digest frame of a modify dialogue.
pub fn read_digest<R: Read>(reader: &mut R) -> Result<Md5Digest, ProtocolError> {
    let mut bytes = [0u8; DIGEST_FRAME_LEN];
    reader.read_exact(&mut bytes)?;
    if bytes[DIGEST_HEX_LEN] != 0 {
        return Err(ProtocolError::MalformedDigest);
    }
    let text = std::str::from_utf8(&bytes[..DIGEST_HEX_LEN])
        .map_err(|_| ProtocolError::MalformedDigest)?;
    Md5Digest::parse_hex(text).ok_or(ProtocolError::MalformedDigest)
}

/// Server answer to a digest probe.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Reply {
    /// Content with this digest is already on the server; no body follows.
    OnServer,
    /// Content is unknown; the sender streams the file body.
    NotOnServer,
}

impl Reply {
    const ON_SERVER: &'static [u8] = b"File On Server";
    const NOT_ON_SERVER: &'static [u8] = b"File Not On Server";

    /// Encodes the reply into its fixed zero-padded frame.
    #[must_use]
    pub fn encode(self) -> [u8; REPLY_LEN] {
        let text = match self {
            Self::OnServer => Self::ON_SERVER,
            Self::NotOnServer => Self::NOT_ON_SERVER,
        };
        let mut out = [0u8; REPLY_LEN];
        out[..text.len()].copy_from_slice(text);
        out
    }

    /// Decodes a reply frame.
    ///
    /// The sentinel is compared up to the first NUL of the received frame, so
    /// a frame is either a complete match or an error; there is no state in
    /// which a truncated read half-matches.
    pub fn decode(bytes: &[u8; REPLY_LEN]) -> Result<Self, ProtocolError> {
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(REPLY_LEN);
        match &bytes[..end] {
            text if text == Self::ON_SERVER => Ok(Self::OnServer),
            text if text == Self::NOT_ON_SERVER => Ok(Self::NotOnServer),
            _ => Err(ProtocolError::UnknownReply),
        }
    }
}

/// Writes a reply frame.
pub fn write_reply<W: Write>(writer: &mut W, reply: Reply) -> Result<(), ProtocolError> {
    writer.write_all(&reply.encode())?;
    Ok(())
}

/// Reads a reply frame.
pub fn read_reply<R: Read>(reader: &mut R) -> Result<Reply, ProtocolError> {
    let mut bytes = [0u8; REPLY_LEN];
    reader.read_exact(&mut bytes)?;
    Reply::decode(&bytes)
}

/// Writes the big-endian file-size hint that precedes a file body.
pub fn write_file_size<W: Write>(writer: &mut W, size: u32) -> Result<(), ProtocolError> {
    writer.write_all(&size.to_be_bytes())?;
    Ok(())
}

/// Reads the file-size hint, converting back to host order.
///
/// The value is advisory; receivers terminate on the chunk EOF flag, never on
/// this count.
pub fn read_file_size<R: Read>(reader: &mut R) -> Result<u32, ProtocolError> {
    let mut bytes = [0u8; 4];
    reader.read_exact(&mut bytes)?;
    Ok(u32::from_be_bytes(bytes))
}

/// One decoded chunk of a file body.
#[derive(Clone, Copy)]
pub struct Chunk {
    /// Set on the final frame of a body.
    pub eof: bool,
    /// Number of payload bytes used, at most [`CHUNK_DATA_LEN`].
    len: usize,
    payload: [u8; CHUNK_DATA_LEN],
}

impl Chunk {
    /// Returns the used portion of the payload.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.payload[..self.len]
    }
}

impl std::fmt::Debug for Chunk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chunk")
            .field("eof", &self.eof)
            .field("len", &self.len)
            .finish()
    }
}

/// Writes one fixed-size chunk frame.
///
/// `data` must fit in a frame; the unused tail of the payload is zero padded
/// so every frame is exactly [`CHUNK_FRAME_LEN`] bytes.
pub fn write_chunk<W: Write>(writer: &mut W, eof: bool, data: &[u8]) -> Result<(), ProtocolError> {
    if data.len() > CHUNK_DATA_LEN {
        return Err(ProtocolError::OversizedChunk {
            len: data.len() as u32,
            max: CHUNK_DATA_LEN,
        });
    }
    writer.write_all(&u32::from(eof).to_le_bytes())?;
    writer.write_all(&(data.len() as u32).to_le_bytes())?;
    let mut payload = [0u8; CHUNK_DATA_LEN];
    payload[..data.len()].copy_from_slice(data);
    writer.write_all(&payload)?;
    Ok(())
}

/// Reads one fixed-size chunk frame.
pub fn read_chunk<R: Read>(reader: &mut R) -> Result<Chunk, ProtocolError> {
    let mut head = [0u8; 8];
    reader.read_exact(&mut head)?;
    let eof = u32::from_le_bytes(head[0..4].try_into().expect("4 bytes")) != 0;
    let len = u32::from_le_bytes(head[4..8].try_into().expect("4 bytes"));
    if len as usize > CHUNK_DATA_LEN {
        return Err(ProtocolError::OversizedChunk {
            len,
            max: CHUNK_DATA_LEN,
        });
    }
    let mut payload = [0u8; CHUNK_DATA_LEN];
    reader.read_exact(&mut payload)?;
    Ok(Chunk {
        eof,
        len: len as usize,
        payload,
    })
}
