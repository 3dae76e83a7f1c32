//! Per-path aggregation records.
//!
//! One [`FileInfo`] condenses the event history of one path since the last
//! transmission. New events override parts of the history that no longer
//! matter: a recreation wipes an earlier delete, a modify pulls a path back
//! in after a moved-from, and so on. The map key is always the record's
//! *current* relative path; renames re-key the record.

use std::collections::HashMap;

use protocol::FileKind;
use watch::NodeId;

/// Aggregated event history of a single path.
#[derive(Debug, Clone)]
pub struct FileInfo {
    /// Kind observed for the path (directories and non-directories may
    /// alternate when a path is deleted and recreated).
    pub kind: FileKind,
    /// Whether the path existed before the first recorded event. A delete of
    /// something the server never saw is a no-op and is dropped at
    /// transmission.
    pub pre_existed: bool,
    /// Watch node of the containing directory.
    pub parent: NodeId,
    /// Short name of the path.
    pub name: String,
    /// Current `./`-anchored relative path; equals the map key.
    pub rel_path: String,
    /// Resolved `./`-anchored target, symlinks only.
    pub link_target: Option<String>,
    /// Size observed when the record was last touched; advisory.
    pub size: u64,

    /// The path was created.
    pub was_created: bool,
    /// The path was deleted.
    pub was_deleted: bool,
    /// File content was modified.
    pub was_modified: bool,
    /// The path left the replicated tree (unmatched moved-from).
    pub was_moved_from_only: bool,
    /// The path was renamed within the tree (matched moved-from/moved-to).
    pub was_moved_from_and_to: bool,
    /// Pairing cookie of an outstanding moved-from, zero when none.
    pub cookie: u32,

    /// Containing node before the rename, renames only.
    pub old_parent: Option<NodeId>,
    /// Short name before the rename, renames only.
    pub old_name: Option<String>,
    /// Relative path before the rename, renames only.
    pub old_rel_path: Option<String>,
}

impl FileInfo {
    /// Creates a blank record with no event history.
    #[must_use]
    pub fn new(kind: FileKind, parent: NodeId, name: String, rel_path: String) -> Self {
        Self {
            kind,
            pre_existed: false,
            parent,
            name,
            rel_path,
            link_target: None,
            size: 0,
            was_created: false,
            was_deleted: false,
            was_modified: false,
            was_moved_from_only: false,
            was_moved_from_and_to: false,
            cookie: 0,
            old_parent: None,
            old_name: None,
            old_rel_path: None,
        }
    }
}

/// Map of aggregation records keyed by current relative path.
#[derive(Debug, Default)]
pub struct FileInfoMap {
    map: HashMap<String, FileInfo>,
}

impl FileInfoMap {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Whether no records are live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Record at `rel_path`, if any.
    #[must_use]
    pub fn get(&self, rel_path: &str) -> Option<&FileInfo> {
        self.map.get(rel_path)
    }

    /// Mutable record at `rel_path`, if any.
    pub fn get_mut(&mut self, rel_path: &str) -> Option<&mut FileInfo> {
        self.map.get_mut(rel_path)
    }

    /// Inserts `info` under its current relative path, replacing any
    /// previous record at that key.
    pub fn insert(&mut self, info: FileInfo) {
        self.map.insert(info.rel_path.clone(), info);
    }

    /// Removes and returns the record at `rel_path`.
    pub fn remove(&mut self, rel_path: &str) -> Option<FileInfo> {
        self.map.remove(rel_path)
    }

    /// Iterates over all records.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &FileInfo)> {
        self.map.iter()
    }

    /// Keys of all records, collected so the map can be mutated while the
    /// caller walks them.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.map.keys().cloned().collect()
    }

    /// Keys of every record strictly below the directory `dir_rel_path`.
    #[must_use]
    pub fn keys_under(&self, dir_rel_path: &str) -> Vec<String> {
        let prefix = format!("{dir_rel_path}/");
        self.map
            .keys()
            .filter(|key| key.starts_with(&prefix))
            .cloned()
            .collect()
    }

    /// Drops every record strictly below the directory `dir_rel_path`.
    ///
    /// Used when a directory delete cascades: the server removes the subtree
    /// recursively, so child operations must never reach the wire.
    pub fn remove_subtree(&mut self, dir_rel_path: &str) -> usize {
        let keys = self.keys_under(dir_rel_path);
        for key in &keys {
            self.map.remove(key);
        }
        keys.len()
    }

    /// Stamps `cookie` into every record strictly below `dir_rel_path`.
    ///
    /// A directory moved-from marks its recorded descendants this way; a
    /// matching moved-to later rewrites exactly the stamped records.
    pub fn stamp_cookie_under(&mut self, dir_rel_path: &str, cookie: u32) {
        let prefix = format!("{dir_rel_path}/");
        for (key, info) in &mut self.map {
            if key.starts_with(&prefix) {
                info.cookie = cookie;
            }
        }
    }

    /// Finds the record holding an outstanding moved-from with `cookie`.
    ///
    /// Descendants of a moved directory carry the same cookie but not the
    /// moved-from flag, and a directory's cookie can only be closed by a
    /// directory moved-to, hence both filters. Linear scan: cookies live
    /// only for the brief window between the two halves of a rename.
    #[must_use]
    pub fn find_by_cookie(&self, cookie: u32, directory: bool) -> Option<String> {
        if cookie == 0 {
            return None;
        }
        self.map
            .iter()
            .find(|(_, info)| {
                info.cookie == cookie
                    && info.was_moved_from_only
                    && (info.kind == FileKind::Directory) == directory
            })
            .map(|(key, _)| key.clone())
    }

    /// Keys of every record stamped with `cookie`.
    #[must_use]
    pub fn keys_with_cookie(&self, cookie: u32) -> Vec<String> {
        self.map
            .iter()
            .filter(|(_, info)| info.cookie == cookie)
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Drops all records.
    pub fn clear(&mut self) {
        self.map.clear();
    }
}
