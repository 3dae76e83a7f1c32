use std::collections::HashMap;
use std::io;
use std::os::fd::{AsRawFd, BorrowedFd};
use std::path::{Path, PathBuf};
use std::time::Duration;

use inotify::{EventMask, Inotify, WatchDescriptor, WatchMask};
use rustix::event::{PollFd, PollFlags};
use tracing::{trace, warn};

use crate::error::WatchError;
use crate::events::{classify, RawEvent};
use crate::tree::{Node, NodeArena, NodeId};

/// Sized for a full batch of events with maximal names, per inotify(7).
const EVENT_BUF_LEN: usize = 64 * 1024;

struct WatchEntry {
    descriptor: WatchDescriptor,
    abs_path: PathBuf,
    rel_path: String,
    node: NodeId,
}

/// The live set of watched directories: kernel handle, registry, and tree.
///
/// All mutation goes through this type so the three representations cannot
/// drift apart. See the crate docs for the invariants.
pub struct WatchSet {
    inotify: Inotify,
    entries: Vec<WatchEntry>,
    by_descriptor: HashMap<WatchDescriptor, usize>,
    nodes: NodeArena,
    root: NodeId,
    event_buf: Vec<u8>,
}

fn watch_mask() -> WatchMask {
    WatchMask::CREATE
        | WatchMask::DELETE
        | WatchMask::MOVED_FROM
        | WatchMask::MOVED_TO
        | WatchMask::MODIFY
}

fn join_rel(parent: &str, name: &str) -> String {
    format!("{parent}/{name}")
}

impl WatchSet {
    /// Creates the event handle and installs the watch for the root.
    ///
    /// `root_abs` must be an absolute, fully resolved directory path; it
    /// becomes relative path `.` and depth 0.
    pub fn initialize(root_abs: &Path) -> Result<Self, WatchError> {
        let inotify = Inotify::init().map_err(WatchError::init)?;
        let descriptor = inotify
            .watches()
            .add(root_abs, watch_mask())
            .map_err(|e| WatchError::add_watch(root_abs.to_path_buf(), e))?;

        let mut nodes = NodeArena::default();
        let root = nodes.insert(Node {
            name: String::new(),
            depth: 0,
            parent: None,
            children: Vec::new(),
            entry: 0,
        });

        let mut by_descriptor = HashMap::new();
        by_descriptor.insert(descriptor.clone(), 0);

        Ok(Self {
            inotify,
            entries: vec![WatchEntry {
                descriptor,
                abs_path: root_abs.to_path_buf(),
                rel_path: ".".to_owned(),
                node: root,
            }],
            by_descriptor,
            nodes,
            root,
            event_buf: vec![0u8; EVENT_BUF_LEN],
        })
    }

    /// Node of the replicated root.
    #[must_use]
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Number of live kernel watches.
    #[must_use]
    pub fn watch_count(&self) -> usize {
        self.entries.len()
    }

    /// Whether `node` is still alive.
    #[must_use]
    pub fn contains(&self, node: NodeId) -> bool {
        self.nodes.contains(node)
    }

    /// Depth of `node`; the root has depth 0.
    #[must_use]
    pub fn depth(&self, node: NodeId) -> u32 {
        self.nodes.get(node).depth
    }

    /// Short directory name of `node` (empty for the root).
    #[must_use]
    pub fn name(&self, node: NodeId) -> &str {
        &self.nodes.get(node).name
    }

    /// Parent of `node`, `None` for the root.
    #[must_use]
    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes.get(node).parent
    }

    /// `./`-anchored relative path of the directory watched by `node`.
    #[must_use]
    pub fn rel_path(&self, node: NodeId) -> &str {
        &self.entries[self.nodes.get(node).entry].rel_path
    }

    /// Absolute path of the directory watched by `node`.
    #[must_use]
    pub fn abs_path(&self, node: NodeId) -> &Path {
        &self.entries[self.nodes.get(node).entry].abs_path
    }

    /// Child of `parent` with the given short name, if watched.
    #[must_use]
    pub fn find_child(&self, parent: NodeId, name: &str) -> Option<NodeId> {
        self.nodes.find_child(parent, name)
    }

    /// Resolves a kernel watch descriptor to its node.
    #[must_use]
    pub fn node_by_descriptor(&self, descriptor: &WatchDescriptor) -> Option<NodeId> {
        self.by_descriptor
            .get(descriptor)
            .map(|&index| self.entries[index].node)
    }

    /// Acquires a kernel watch for `parent/name` and grows tree and registry.
    ///
    /// Fails with [`WatchErrorKind::DuplicateChild`] if a same-named child is
    /// already watched; callers evict the stale subtree first.
    ///
    /// [`WatchErrorKind::DuplicateChild`]: crate::WatchErrorKind::DuplicateChild
    pub fn add_directory(&mut self, parent: NodeId, name: &str) -> Result<NodeId, WatchError> {
        let abs_path = self.abs_path(parent).join(name);
        if self.find_child(parent, name).is_some() {
            return Err(WatchError::duplicate_child(abs_path));
        }

        let rel_path = join_rel(self.rel_path(parent), name);
        let descriptor = self
            .inotify
            .watches()
            .add(&abs_path, watch_mask())
            .map_err(|e| WatchError::add_watch(abs_path.clone(), e))?;

        let entry_index = self.entries.len();
        let node = self.nodes.insert(Node {
            name: name.to_owned(),
            depth: 0,
            parent: None,
            children: Vec::new(),
            entry: entry_index,
        });
        self.nodes.attach(parent, node);

        self.by_descriptor.insert(descriptor.clone(), entry_index);
        self.entries.push(WatchEntry {
            descriptor,
            abs_path,
            rel_path,
            node,
        });

        trace!(path = self.rel_path(node), "watch added");
        Ok(node)
    }

    /// Destroys `node` and everything beneath it.
    ///
    /// Kernel watches are released best-effort: when the watched directory
    /// was already deleted the kernel has dropped the watch on its own and
    /// the removal call reports `EINVAL`, which is not an error here.
    pub fn remove_subtree(&mut self, node: NodeId) {
        self.nodes.detach(node);
        // Children before parents so each slot is freed exactly once.
        for id in self.nodes.subtree(node).into_iter().rev() {
            let freed = self.nodes.remove(id);
            let index = freed.entry;
            let entry = self.entries.swap_remove(index);
            self.by_descriptor.remove(&entry.descriptor);
            let _ = self.inotify.watches().remove(entry.descriptor.clone());
            trace!(path = %entry.rel_path, "watch removed");

            if index < self.entries.len() {
                let moved_node = self.entries[index].node;
                self.nodes.get_mut(moved_node).entry = index;
                self.by_descriptor
                    .insert(self.entries[index].descriptor.clone(), index);
            }
        }
    }

    /// Splices `node` under `new_parent` as `new_name` and rewrites paths.
    ///
    /// The kernel watches of the subtree are untouched (inotify watches
    /// follow the inode), so a rename costs exactly the path rewrite.
    pub fn reparent(
        &mut self,
        node: NodeId,
        new_parent: NodeId,
        new_name: &str,
    ) -> Result<(), WatchError> {
        if self
            .find_child(new_parent, new_name)
            .is_some_and(|existing| existing != node)
        {
            return Err(WatchError::duplicate_child(
                self.abs_path(new_parent).join(new_name),
            ));
        }
        self.nodes.detach(node);
        self.nodes.get_mut(node).name = new_name.to_owned();
        self.nodes.attach(new_parent, node);
        self.rederive_paths(node);
        Ok(())
    }

    /// Recomputes relative and absolute paths plus depths below `start`.
    ///
    /// Breadth-first so every node's parent paths are already rewritten when
    /// the node itself is visited. Cost is proportional to the subtree size,
    /// paid only on directory renames.
    fn rederive_paths(&mut self, start: NodeId) {
        for id in self.nodes.subtree(start) {
            let parent = self.nodes.get(id).parent.expect("subtree below the root");
            let parent_entry = self.nodes.get(parent).entry;
            let rel = join_rel(
                &self.entries[parent_entry].rel_path,
                &self.nodes.get(id).name,
            );
            let abs = self.entries[parent_entry]
                .abs_path
                .join(&self.nodes.get(id).name);
            let depth = self.nodes.get(parent).depth + 1;

            let entry_index = self.nodes.get(id).entry;
            self.entries[entry_index].rel_path = rel;
            self.entries[entry_index].abs_path = abs;
            self.nodes.get_mut(id).depth = depth;
        }
    }

    /// Blocks until the event descriptor is readable or `timeout` expires.
    ///
    /// `None` waits indefinitely. Returns whether events are ready.
    pub fn wait_readable(&self, timeout: Option<Duration>) -> Result<bool, WatchError> {
        // SAFETY: the descriptor is owned by `self.inotify`, which outlives
        // the borrow for the duration of the poll call.
        let fd = unsafe { BorrowedFd::borrow_raw(self.inotify.as_raw_fd()) };
        let mut fds = [PollFd::from_borrowed_fd(fd, PollFlags::IN)];
        let timeout_ms = match timeout {
            None => -1,
            Some(t) => i32::try_from(t.as_millis()).unwrap_or(i32::MAX),
        };
        let ready = rustix::event::poll(&mut fds, timeout_ms)
            .map_err(|e| WatchError::poll(io::Error::from(e)))?;
        Ok(ready > 0)
    }

    /// Drains every event currently queued by the kernel, without blocking.
    ///
    /// Events on the watched directories themselves (empty name), events with
    /// non-UTF-8 names, and bookkeeping masks are skipped; a kernel queue
    /// overflow is surfaced as a warning because lost events mean lost
    /// fidelity until the next full state exchange.
    pub fn drain_events(&mut self) -> Result<Vec<RawEvent>, WatchError> {
        let mut drained = Vec::new();
        loop {
            let events = match self.inotify.read_events(&mut self.event_buf) {
                Ok(events) => events,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(WatchError::events(e)),
            };

            let mut any = false;
            for event in events {
                any = true;
                if event.mask.contains(EventMask::Q_OVERFLOW) {
                    warn!("kernel event queue overflowed; changes may have been lost");
                    continue;
                }
                let Some(kind) = classify(event.mask) else {
                    continue;
                };
                let Some(name) = event.name else {
                    continue;
                };
                if name.is_empty() {
                    continue;
                }
                let Some(name) = name.to_str() else {
                    warn!(?name, "skipping event for non-UTF-8 name");
                    continue;
                };
                drained.push(RawEvent {
                    descriptor: event.wd.clone(),
                    name: name.to_owned(),
                    kind,
                    cookie: event.cookie,
                    is_dir: event.mask.contains(EventMask::ISDIR),
                });
            }
            if !any {
                break;
            }
        }
        Ok(drained)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{RawKind, WatchErrorKind};
    use std::fs;

    fn fixture() -> (tempfile::TempDir, WatchSet) {
        let dir = tempfile::tempdir().expect("tempdir");
        let set = WatchSet::initialize(dir.path()).expect("initialize");
        (dir, set)
    }

    #[test]
    fn root_is_anchored_at_dot() {
        let (_dir, set) = fixture();
        assert_eq!(set.rel_path(set.root()), ".");
        assert_eq!(set.depth(set.root()), 0);
        assert_eq!(set.watch_count(), 1);
    }

    #[test]
    fn added_directories_derive_paths_from_parent() {
        let (dir, mut set) = fixture();
        fs::create_dir(dir.path().join("a")).expect("mkdir a");
        fs::create_dir(dir.path().join("a/b")).expect("mkdir a/b");

        let a = set.add_directory(set.root(), "a").expect("watch a");
        let b = set.add_directory(a, "b").expect("watch b");

        assert_eq!(set.rel_path(a), "./a");
        assert_eq!(set.rel_path(b), "./a/b");
        assert_eq!(set.abs_path(b), dir.path().join("a/b"));
        assert_eq!(set.depth(b), 2);
        assert_eq!(set.find_child(set.root(), "a"), Some(a));
        assert_eq!(set.find_child(a, "b"), Some(b));
    }

    #[test]
    fn duplicate_children_are_refused() {
        let (dir, mut set) = fixture();
        fs::create_dir(dir.path().join("a")).expect("mkdir");
        set.add_directory(set.root(), "a").expect("first watch");
        let err = set.add_directory(set.root(), "a").expect_err("duplicate");
        assert!(matches!(err.kind(), WatchErrorKind::DuplicateChild { .. }));
    }

    #[test]
    fn reparent_rewrites_subtree_paths_without_new_watches() {
        let (dir, mut set) = fixture();
        fs::create_dir_all(dir.path().join("a/inner")).expect("mkdir a/inner");
        fs::create_dir(dir.path().join("b")).expect("mkdir b");

        let a = set.add_directory(set.root(), "a").expect("watch a");
        let inner = set.add_directory(a, "inner").expect("watch inner");
        let b = set.add_directory(set.root(), "b").expect("watch b");
        let watches_before = set.watch_count();

        // Filesystem rename happens first in real flows; the watch set only
        // rewrites its own bookkeeping.
        fs::rename(dir.path().join("a"), dir.path().join("b/a2")).expect("rename");
        set.reparent(a, b, "a2").expect("reparent");

        assert_eq!(set.rel_path(a), "./b/a2");
        assert_eq!(set.rel_path(inner), "./b/a2/inner");
        assert_eq!(set.abs_path(inner), dir.path().join("b/a2/inner"));
        assert_eq!(set.depth(inner), 3);
        assert_eq!(set.watch_count(), watches_before);
        assert_eq!(set.find_child(b, "a2"), Some(a));
        assert_eq!(set.find_child(set.root(), "a2"), None);
    }

    #[test]
    fn remove_subtree_releases_every_entry_and_patches_the_moved_one() {
        let (dir, mut set) = fixture();
        fs::create_dir_all(dir.path().join("a/x")).expect("mkdir a/x");
        fs::create_dir(dir.path().join("b")).expect("mkdir b");

        let a = set.add_directory(set.root(), "a").expect("watch a");
        set.add_directory(a, "x").expect("watch a/x");
        let b = set.add_directory(set.root(), "b").expect("watch b");

        set.remove_subtree(a);

        assert_eq!(set.watch_count(), 2);
        assert!(!set.contains(a));
        assert_eq!(set.find_child(set.root(), "a"), None);
        // The swap-removed slot now belongs to "b"; its cross-links must
        // still resolve.
        assert_eq!(set.rel_path(b), "./b");
        let descriptor_of_b = set.entries[set.nodes.get(b).entry].descriptor.clone();
        assert_eq!(set.node_by_descriptor(&descriptor_of_b), Some(b));
    }

    #[test]
    fn drain_reports_create_and_modify_events() {
        let (dir, mut set) = fixture();
        fs::create_dir(dir.path().join("sub")).expect("mkdir");
        fs::write(dir.path().join("file.txt"), b"one").expect("write");

        assert!(set
            .wait_readable(Some(Duration::from_secs(5)))
            .expect("poll"));
        let events = set.drain_events().expect("drain");

        assert!(events
            .iter()
            .any(|e| e.kind == RawKind::Create && e.name == "sub" && e.is_dir));
        assert!(events
            .iter()
            .any(|e| e.name == "file.txt" && !e.is_dir));
        assert!(events
            .iter()
            .all(|e| set.node_by_descriptor(&e.descriptor) == Some(set.root())));
    }
}
