use std::io::{Read, Write};

use crate::error::ProtocolError;

/// Encoded size of an [`OpHeader`] on the wire.
pub const HEADER_LEN: usize = 14;

/// Operation carried by a header.
///
/// `Delete`/`MovedFrom` and `Modify`/`FilMovedTo` are applied identically by
/// the server; the distinct tags preserve *why* the client decided on the
/// operation, which keeps the transfer journal readable on both ends.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u32)]
pub enum OpTag {
    /// Create an empty file, directory, or symlink.
    Create = 1,
    /// Remove a path (recursively for directories).
    Delete = 2,
    /// Rename a path; old path follows in the tail.
    Move = 3,
    /// Replace content; digest dialogue follows in the tail.
    Modify = 4,
    /// The path left the replicated tree: delete semantics.
    MovedFrom = 5,
    /// A directory arrived from outside the tree.
    MovedTo = 6,
    /// Rename of a file that was also modified; a `Modify` follows.
    FilMove = 7,
    /// A file arrived from outside the tree: modify semantics.
    FilMovedTo = 8,
}

impl OpTag {
    /// Decodes a raw tag value.
    pub fn from_u32(raw: u32) -> Result<Self, ProtocolError> {
        Ok(match raw {
            1 => Self::Create,
            2 => Self::Delete,
            3 => Self::Move,
            4 => Self::Modify,
            5 => Self::MovedFrom,
            6 => Self::MovedTo,
            7 => Self::FilMove,
            8 => Self::FilMovedTo,
            other => return Err(ProtocolError::UnknownOpTag(other)),
        })
    }

    /// True for the two tags that open a digest dialogue.
    #[must_use]
    pub const fn carries_digest(self) -> bool {
        matches!(self, Self::Modify | Self::FilMovedTo)
    }

    /// True for the two tags whose tail carries the old path.
    #[must_use]
    pub const fn carries_old_path(self) -> bool {
        matches!(self, Self::Move | Self::FilMove)
    }
}

/// Kind of the file a header refers to.
///
/// The client only ever emits `Directory`, `NonDir`, and `Symlink`; the finer
/// values exist so a future sender can be more precise without a wire change.
/// The server treats everything that is not a directory or symlink alike.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u32)]
pub enum FileKind {
    /// Kind could not be determined.
    Unknown = 0,
    /// Regular file.
    Regular = 1,
    /// Directory.
    Directory = 2,
    /// Symbolic link.
    Symlink = 3,
    /// Hard link to a regular file.
    Hardlink = 4,
    /// Any non-directory file.
    NonDir = 5,
}

impl FileKind {
    /// Decodes a raw kind value.
    pub fn from_u32(raw: u32) -> Result<Self, ProtocolError> {
        Ok(match raw {
            0 => Self::Unknown,
            1 => Self::Regular,
            2 => Self::Directory,
            3 => Self::Symlink,
            4 => Self::Hardlink,
            5 => Self::NonDir,
            other => return Err(ProtocolError::UnknownFileKind(other)),
        })
    }

    /// True for [`FileKind::Directory`].
    #[must_use]
    pub const fn is_directory(self) -> bool {
        matches!(self, Self::Directory)
    }
}

/// Fixed-size operation header.
///
/// Length fields count path bytes excluding the NUL terminator that follows
/// each path on the wire; a zero length means the corresponding tail section
/// is absent.
///
/// # Examples
///
/// ```
/// use protocol::{FileKind, OpHeader, OpTag};
///
/// let header = OpHeader::new(OpTag::Create, FileKind::Directory, 7, 0, 0);
/// let decoded = OpHeader::decode(&header.encode()).expect("round trip");
/// assert_eq!(decoded, header);
/// ```
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct OpHeader {
    /// Operation to apply.
    pub op: OpTag,
    /// Kind of the file the operation refers to.
    pub kind: FileKind,
    /// Length of the current relative path.
    pub rel_path_len: u16,
    /// Length of the resolved symlink target, zero when absent.
    pub link_target_len: u16,
    /// Length of the old relative path, zero when absent.
    pub old_path_len: u16,
}

impl OpHeader {
    /// Builds a header from its parts.
    #[must_use]
    pub const fn new(
        op: OpTag,
        kind: FileKind,
        rel_path_len: u16,
        link_target_len: u16,
        old_path_len: u16,
    ) -> Self {
        Self {
            op,
            kind,
            rel_path_len,
            link_target_len,
            old_path_len,
        }
    }

    /// Encodes the header into its 14-byte wire form.
    #[must_use]
    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[0..4].copy_from_slice(&(self.op as u32).to_le_bytes());
        out[4..8].copy_from_slice(&(self.kind as u32).to_le_bytes());
        out[8..10].copy_from_slice(&self.rel_path_len.to_le_bytes());
        out[10..12].copy_from_slice(&self.link_target_len.to_le_bytes());
        out[12..14].copy_from_slice(&self.old_path_len.to_le_bytes());
        out
    }

    /// Decodes a header from its 14-byte wire form.
    pub fn decode(bytes: &[u8; HEADER_LEN]) -> Result<Self, ProtocolError> {
        let op = OpTag::from_u32(u32::from_le_bytes(bytes[0..4].try_into().expect("4 bytes")))?;
        let kind =
            FileKind::from_u32(u32::from_le_bytes(bytes[4..8].try_into().expect("4 bytes")))?;
        Ok(Self {
            op,
            kind,
            rel_path_len: u16::from_le_bytes(bytes[8..10].try_into().expect("2 bytes")),
            link_target_len: u16::from_le_bytes(bytes[10..12].try_into().expect("2 bytes")),
            old_path_len: u16::from_le_bytes(bytes[12..14].try_into().expect("2 bytes")),
        })
    }

    /// Writes the encoded header to `writer`.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<(), ProtocolError> {
        writer.write_all(&self.encode())?;
        Ok(())
    }

    /// Reads and decodes a header from `reader`.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self, ProtocolError> {
        let mut bytes = [0u8; HEADER_LEN];
        reader.read_exact(&mut bytes)?;
        Self::decode(&bytes)
    }
}
