//! Content index of the mirror.
//!
//! Two views over the same facts. The by-path map is authoritative: one
//! entry per file the server has applied content for. The digest-to-path
//! side table is a best-effort cache answering "do I already hold this
//! content somewhere". On digest collision the last writer wins, and a
//! chain of deletes over files sharing a digest can leave it pointing at
//! nothing. That staleness is tolerated by design; lookups verify the file
//! still exists and the worst case is one redundant transfer.
//!
//! The index lives in memory only. It is rebuilt by hashing the mirror tree
//! at every server start.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use checksums::Md5Digest;
use tracing::{debug, warn};

/// Per-file record: where it lives, what its content hashes to, how big.
#[derive(Clone, Debug)]
pub struct HashInfo {
    /// `./`-anchored path relative to the mirror root.
    pub rel_path: String,
    /// Digest of the file content.
    pub digest: Md5Digest,
    /// File size in bytes.
    pub size: u64,
}

/// The dual-view content index.
#[derive(Debug, Default)]
pub struct HashIndex {
    by_path: HashMap<String, HashInfo>,
    by_digest: HashMap<Md5Digest, String>,
}

impl HashIndex {
    /// Creates an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of indexed files.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_path.len()
    }

    /// Whether the index is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_path.is_empty()
    }

    /// Record for `rel_path`, if any.
    #[must_use]
    pub fn get(&self, rel_path: &str) -> Option<&HashInfo> {
        self.by_path.get(rel_path)
    }

    /// Some path whose last applied content hashed to `digest`.
    ///
    /// Best effort: the returned path may no longer exist on disk; callers
    /// check before acting on it.
    #[must_use]
    pub fn path_for_digest(&self, digest: &Md5Digest) -> Option<&str> {
        self.by_digest.get(digest).map(String::as_str)
    }

    /// Records content at `rel_path`. Last writer wins on the digest side.
    pub fn insert(&mut self, rel_path: String, digest: Md5Digest, size: u64) {
        self.by_digest.insert(digest, rel_path.clone());
        self.by_path.insert(
            rel_path.clone(),
            HashInfo {
                rel_path,
                digest,
                size,
            },
        );
    }

    /// Forgets `rel_path`.
    ///
    /// The digest side is pruned only while it still points at this path;
    /// if another file overwrote the digest slot, that mapping stays.
    pub fn remove_path(&mut self, rel_path: &str) -> Option<HashInfo> {
        let info = self.by_path.remove(rel_path)?;
        if self
            .by_digest
            .get(&info.digest)
            .is_some_and(|owner| owner == rel_path)
        {
            self.by_digest.remove(&info.digest);
        }
        Some(info)
    }

    /// Forgets every path strictly below the directory `dir_rel_path`.
    pub fn remove_dir(&mut self, dir_rel_path: &str) -> usize {
        let prefix = format!("{dir_rel_path}/");
        let doomed: Vec<String> = self
            .by_path
            .keys()
            .filter(|key| key.starts_with(&prefix))
            .cloned()
            .collect();
        for key in &doomed {
            self.remove_path(key);
        }
        doomed.len()
    }

    /// Re-keys one file after a rename.
    pub fn rename_path(&mut self, old_rel: &str, new_rel: &str) {
        let Some(info) = self.by_path.remove(old_rel) else {
            return;
        };
        if self
            .by_digest
            .get(&info.digest)
            .is_some_and(|owner| owner == old_rel)
        {
            self.by_digest.insert(info.digest, new_rel.to_owned());
        }
        self.by_path.insert(
            new_rel.to_owned(),
            HashInfo {
                rel_path: new_rel.to_owned(),
                ..info
            },
        );
    }

    /// Re-keys every file under a renamed directory.
    pub fn rename_dir(&mut self, old_dir_rel: &str, new_dir_rel: &str) -> usize {
        let prefix = format!("{old_dir_rel}/");
        let affected: Vec<String> = self
            .by_path
            .keys()
            .filter(|key| key.starts_with(&prefix))
            .cloned()
            .collect();
        for old_key in &affected {
            let new_key = format!("{}/{}", new_dir_rel, &old_key[prefix.len()..]);
            self.rename_path(old_key, &new_key);
        }
        affected.len()
    }

    /// Builds the index by hashing every regular file under `root`.
    ///
    /// Unreadable entries are skipped with a warning; the server would
    /// rather start with a hole in the index (one redundant transfer) than
    /// refuse to start.
    pub fn build(root: &Path) -> io::Result<Self> {
        let mut index = Self::new();
        let mut stack: Vec<(PathBuf, String)> = vec![(root.to_path_buf(), ".".to_owned())];

        while let Some((dir_abs, dir_rel)) = stack.pop() {
            let entries = match fs::read_dir(&dir_abs) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(path = %dir_abs.display(), error = %e, "skipping unreadable directory");
                    continue;
                }
            };
            for entry in entries {
                let Ok(entry) = entry else { continue };
                let Ok(name) = entry.file_name().into_string() else {
                    warn!("skipping entry with non-UTF-8 name");
                    continue;
                };
                let abs = dir_abs.join(&name);
                let rel = format!("{dir_rel}/{name}");
                let Ok(meta) = fs::symlink_metadata(&abs) else {
                    continue;
                };
                if meta.is_dir() {
                    stack.push((abs, rel));
                } else if meta.file_type().is_file() {
                    match checksums::hash_file(&abs) {
                        Ok((digest, size)) => {
                            debug!(path = %rel, %digest, "indexed");
                            index.insert(rel, digest, size);
                        }
                        Err(e) => {
                            warn!(path = %rel, error = %e, "skipping unhashable file");
                        }
                    }
                }
            }
        }
        Ok(index)
    }
}
