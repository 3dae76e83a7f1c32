//! Applying received operations to the mirror.
//!
//! One operation at a time, strictly sequential, with direct filesystem
//! calls. Application is idempotent under remove-then-create semantics: a
//! create clears whatever sits at the target first, a move replaces its
//! destination, and deletes of already-absent paths are tolerated no-ops
//! (the client's depth ordering makes a child's delete after its parent's a
//! normal occurrence).

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use protocol::{
    read_chunk, read_digest, read_file_size, read_path, write_reply, FileKind, OpHeader, OpTag,
    ProtocolError, Reply,
};
use tracing::{debug, info, warn};

use crate::hash_index::HashIndex;
use crate::DaemonError;

/// Executes operations against the mirror root and maintains the index.
pub struct Applier {
    root: PathBuf,
    index: HashIndex,
}

impl Applier {
    /// Creates an applier over `root` with a pre-built index.
    #[must_use]
    pub fn new(root: PathBuf, index: HashIndex) -> Self {
        Self { root, index }
    }

    /// Read access to the content index.
    #[must_use]
    pub fn index(&self) -> &HashIndex {
        &self.index
    }

    /// Receives and applies the next operation from the stream.
    ///
    /// Returns `Ok(None)` when the peer closed the connection cleanly, that
    /// is, before a header. Anything else that cuts a frame short is an
    /// error.
    pub fn apply_next<S: Read + Write>(
        &mut self,
        stream: &mut S,
    ) -> Result<Option<OpTag>, DaemonError> {
        let header = match OpHeader::read_from(stream) {
            Ok(header) => header,
            Err(ProtocolError::Io(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };
        let rel = read_path(stream, header.rel_path_len)?;
        info!(tag = ?header.op, kind = ?header.kind, path = %rel, "operation received");

        match header.op {
            OpTag::Delete | OpTag::MovedFrom => self.apply_delete(&header, &rel)?,
            OpTag::Modify | OpTag::FilMovedTo => self.apply_modify(stream, &rel)?,
            OpTag::Create => self.apply_create(stream, &header, &rel)?,
            OpTag::Move | OpTag::FilMove => self.apply_move(stream, &header, &rel)?,
            OpTag::MovedTo => return Err(DaemonError::Unsupported(header.op)),
        }
        Ok(Some(header.op))
    }

    fn abs(&self, rel: &str) -> PathBuf {
        match rel.strip_prefix("./") {
            Some(suffix) => self.root.join(suffix),
            None => self.root.clone(),
        }
    }

    fn apply_delete(&mut self, header: &OpHeader, rel: &str) -> Result<(), DaemonError> {
        let abs = self.abs(rel);
        if header.kind.is_directory() {
            match fs::remove_dir_all(&abs) {
                Ok(()) => info!(path = %rel, "directory removed"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    debug!(path = %rel, "directory already absent");
                }
                Err(e) => return Err(e.into()),
            }
            let pruned = self.index.remove_dir(rel);
            debug!(path = %rel, pruned, "index pruned");
        } else {
            match fs::remove_file(&abs) {
                Ok(()) => info!(path = %rel, "file removed"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    debug!(path = %rel, "file already absent");
                }
                Err(e) => return Err(e.into()),
            }
            self.index.remove_path(rel);
        }
        Ok(())
    }

    /// The digest dialogue, server side.
    ///
    /// On a digest hit the content is copied locally and only the by-path
    /// view changes; on a miss the body is received chunk by chunk. The
    /// chunk stream is always drained fully, even when the local disk write
    /// fails, so one bad file cannot desynchronise the session.
    fn apply_modify<S: Read + Write>(&mut self, stream: &mut S, rel: &str) -> Result<(), DaemonError> {
        let digest = read_digest(stream)?;
        let known_source = self
            .index
            .path_for_digest(&digest)
            .map(str::to_owned)
            .filter(|source| fs::symlink_metadata(self.abs(source)).is_ok());

        match known_source {
            Some(source) => {
                write_reply(stream, Reply::OnServer)?;
                info!(path = %rel, from = %source, "content already present; copying locally");
                if source == rel {
                    // The file re-hashed to what we already hold.
                    let size = self.index.get(rel).map_or(0, |info| info.size);
                    self.index.insert(rel.to_owned(), digest, size);
                } else {
                    let size = fs::copy(self.abs(&source), self.abs(rel))?;
                    self.index.insert(rel.to_owned(), digest, size);
                }
            }
            None => {
                write_reply(stream, Reply::NotOnServer)?;
                let size_hint = read_file_size(stream)?;
                debug!(path = %rel, size_hint, "receiving file body");
                let received = self.receive_file(stream, rel)?;
                info!(path = %rel, bytes = received, "file body received");
                self.index.insert(rel.to_owned(), digest, received);
            }
        }
        Ok(())
    }

    /// Receives chunk frames until the EOF flag, writing what it can.
    fn receive_file<S: Read>(&self, stream: &mut S, rel: &str) -> Result<u64, DaemonError> {
        let abs = self.abs(rel);
        let mut file = match File::create(&abs) {
            Ok(file) => Some(file),
            Err(e) => {
                warn!(path = %rel, error = %e, "cannot write file; draining body");
                None
            }
        };

        let mut received = 0u64;
        loop {
            let chunk = read_chunk(stream)?;
            received += chunk.data().len() as u64;
            if let Some(out) = file.as_mut() {
                if let Err(e) = out.write_all(chunk.data()) {
                    warn!(path = %rel, error = %e, "write failed; draining remaining body");
                    file = None;
                }
            }
            if chunk.eof {
                break;
            }
        }
        Ok(received)
    }

    fn apply_create<S: Read>(
        &mut self,
        stream: &mut S,
        header: &OpHeader,
        rel: &str,
    ) -> Result<(), DaemonError> {
        let abs = self.abs(rel);
        match header.kind {
            FileKind::Symlink => {
                let target = read_path(stream, header.link_target_len)?;
                let target_abs = self.abs(&target);
                remove_existing(&abs)?;
                #[cfg(unix)]
                std::os::unix::fs::symlink(&target_abs, &abs)?;
                info!(path = %rel, target = %target, "symlink created");
            }
            FileKind::Directory => {
                remove_existing(&abs)?;
                fs::create_dir(&abs)?;
                info!(path = %rel, "directory created");
            }
            _ => {
                remove_existing(&abs)?;
                File::create(&abs)?;
                info!(path = %rel, "empty file created");
            }
        }
        Ok(())
    }

    fn apply_move<S: Read>(
        &mut self,
        stream: &mut S,
        header: &OpHeader,
        rel: &str,
    ) -> Result<(), DaemonError> {
        let old = read_path(stream, header.old_path_len)?;
        let old_abs = self.abs(&old);
        let new_abs = self.abs(rel);

        if fs::symlink_metadata(&old_abs).is_err() {
            // The origin never made it to this side; materialise an empty
            // destination and let a following modify supply content.
            warn!(path = %rel, from = %old, "move source missing; degrading to create");
            remove_existing(&new_abs)?;
            if header.kind.is_directory() {
                fs::create_dir(&new_abs)?;
            } else {
                File::create(&new_abs)?;
            }
            return Ok(());
        }

        remove_existing(&new_abs)?;
        fs::rename(&old_abs, &new_abs)?;
        if header.kind.is_directory() {
            let rekeyed = self.index.rename_dir(&old, rel);
            info!(path = %rel, from = %old, rekeyed, "directory moved");
        } else {
            self.index.rename_path(&old, rel);
            info!(path = %rel, from = %old, "file moved");
        }
        Ok(())
    }
}

/// Clears whatever occupies `abs`, file or directory, tolerating absence.
fn remove_existing(abs: &Path) -> std::io::Result<()> {
    match fs::symlink_metadata(abs) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(abs),
        Ok(_) => fs::remove_file(abs),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}
