//! Folding raw kernel events into aggregation records.
//!
//! Every event lands here with its containing watch node already resolved.
//! The rules, applied per event:
//!
//! - **delete** marks the record deleted; for a directory it also cascades
//!   over every record beneath it and destroys the child watch subtree.
//! - **moved-from** marks the record as having left the tree and stamps the
//!   pairing cookie; a directory additionally stamps the cookie into every
//!   record beneath it so a matching moved-to can rewrite exactly those.
//! - **moved-to** with a matching cookie closes the pair into an in-tree
//!   rename: the record is re-keyed to the new path, the watch subtree is
//!   spliced under the new parent, and stamped descendants are re-keyed too.
//!   Without a match, a file is folded as a modify (its content must reach
//!   the server) and a directory is expanded: watches plus synthetic events
//!   for everything already inside it.
//! - **modify** marks content changed and pulls the path back in after an
//!   earlier delete or moved-from.
//! - **create** starts a fresh history; for a directory it expands content
//!   exactly like an unmatched moved-to, since entries may have been created
//!   inside before the watch existed.
//!
//! Symbolic links are validated on every touch: a link whose resolved target
//! leaves the replicated root is dropped with a warning before it can reach
//! a record.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use protocol::FileKind;
use tracing::{debug, info, warn};
use watch::{NodeId, RawKind};

use crate::file_info::FileInfo;
use crate::monitor::Monitor;
use crate::EngineError;

/// One event ready for aggregation: raw kernel input with its watch node
/// resolved, or a synthetic event seeded by a scan.
#[derive(Debug)]
pub(crate) struct EventInput {
    pub kind: RawKind,
    pub node: NodeId,
    pub name: String,
    pub cookie: u32,
    pub is_dir: bool,
    /// Synthetic events pin the pre-existed flag; kernel events leave it to
    /// the per-operation default.
    pub existed_hint: Option<bool>,
}

/// Everything `apply_event` derives once per event before folding.
struct EventCtx {
    parent: NodeId,
    name: String,
    rel: String,
    abs: PathBuf,
    kind: FileKind,
    link_target: Option<String>,
    size: u64,
    cookie: u32,
    is_dir: bool,
    existed_hint: Option<bool>,
}

/// Maps a `./`-anchored relative path to its absolute location under `root`.
pub(crate) fn rel_to_abs(root: &Path, rel: &str) -> PathBuf {
    match rel.strip_prefix("./") {
        Some(suffix) => root.join(suffix),
        None => root.to_path_buf(),
    }
}

/// Resolves a symlink and re-anchors its target inside `root`.
///
/// `Ok(None)` means the target escapes the replicated root.
fn resolve_link_target(abs: &Path, root: &Path) -> io::Result<Option<String>> {
    let real = fs::canonicalize(abs)?;
    match real.strip_prefix(root) {
        Ok(suffix) => {
            let suffix = suffix
                .to_str()
                .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "non-UTF-8 target"))?;
            Ok(Some(if suffix.is_empty() {
                ".".to_owned()
            } else {
                format!("./{suffix}")
            }))
        }
        Err(_) => Ok(None),
    }
}

impl Monitor {
    /// Folds one event into the record map, mutating watches as needed.
    pub(crate) fn apply_event(&mut self, event: EventInput) -> Result<(), EngineError> {
        if !self.watches.contains(event.node) {
            warn!(
                name = %event.name,
                "event for a directory no longer watched; skipping"
            );
            return Ok(());
        }

        let rel = format!("{}/{}", self.watches.rel_path(event.node), event.name);
        let abs = self.watches.abs_path(event.node).join(&event.name);
        debug!(
            kind = ?event.kind,
            path = %rel,
            dir = event.is_dir,
            cookie = event.cookie,
            "folding event"
        );

        // Fresh metadata; the path may be gone again already. That is a
        // recoverable anomaly, not an error.
        let metadata = fs::symlink_metadata(&abs).ok();
        let mut kind = if event.is_dir {
            FileKind::Directory
        } else {
            FileKind::NonDir
        };
        let mut link_target = None;
        let mut size = 0;
        if let Some(meta) = &metadata {
            size = meta.len();
            if meta.file_type().is_symlink() {
                match resolve_link_target(&abs, &self.root_abs) {
                    Ok(Some(target)) => {
                        kind = FileKind::Symlink;
                        link_target = Some(target);
                    }
                    Ok(None) => {
                        warn!(path = %rel, "symbolic link escapes the replicated root; event dropped");
                        return Ok(());
                    }
                    Err(e) => {
                        warn!(path = %rel, error = %e, "unresolvable symbolic link; treating as plain file");
                    }
                }
            }
        }

        // An existing record learns the refreshed kind and size up front.
        if let Some(record) = self.infos.get_mut(&rel) {
            if kind == FileKind::Symlink {
                record.kind = FileKind::Symlink;
                record.link_target = link_target.clone();
            }
            record.size = size;
        }

        let ctx = EventCtx {
            parent: event.node,
            name: event.name,
            rel,
            abs,
            kind,
            link_target,
            size,
            cookie: event.cookie,
            is_dir: event.is_dir,
            existed_hint: event.existed_hint,
        };

        match event.kind {
            RawKind::Delete => self.fold_delete(&ctx),
            RawKind::MovedFrom => self.fold_moved_from(&ctx),
            RawKind::MovedTo => self.fold_moved_to(&ctx)?,
            RawKind::Modify => {
                let pre_existed = ctx.existed_hint.unwrap_or(true);
                self.fold_modify(&ctx, pre_existed);
            }
            RawKind::Create => {
                let pre_existed = ctx.existed_hint.unwrap_or(false);
                self.fold_create(&ctx, pre_existed);
                if ctx.is_dir {
                    self.expand_directory(&ctx);
                }
            }
        }
        Ok(())
    }

    fn blank_record(&self, ctx: &EventCtx) -> FileInfo {
        let mut record = FileInfo::new(ctx.kind, ctx.parent, ctx.name.clone(), ctx.rel.clone());
        record.link_target = ctx.link_target.clone();
        record.size = ctx.size;
        record
    }

    fn fold_delete(&mut self, ctx: &EventCtx) {
        match self.infos.get_mut(&ctx.rel) {
            Some(record) => {
                record.was_deleted = true;
                record.was_moved_from_and_to = false;
            }
            None => {
                let mut record = self.blank_record(ctx);
                record.pre_existed = true;
                record.was_deleted = true;
                self.infos.insert(record);
            }
        }

        if ctx.is_dir {
            let dropped = self.infos.remove_subtree(&ctx.rel);
            if dropped > 0 {
                debug!(path = %ctx.rel, records = dropped, "delete cascaded over nested records");
            }
            if let Some(child) = self.watches.find_child(ctx.parent, &ctx.name) {
                self.watches.remove_subtree(child);
            }
        }
    }

    fn fold_moved_from(&mut self, ctx: &EventCtx) {
        match self.infos.get_mut(&ctx.rel) {
            Some(record) => {
                record.was_moved_from_only = true;
                record.was_deleted = false;
                record.was_moved_from_and_to = false;
                record.cookie = ctx.cookie;
            }
            None => {
                let mut record = self.blank_record(ctx);
                record.pre_existed = true;
                record.was_moved_from_only = true;
                record.cookie = ctx.cookie;
                self.infos.insert(record);
            }
        }

        if ctx.is_dir {
            self.infos.stamp_cookie_under(&ctx.rel, ctx.cookie);
        }
    }

    fn fold_modify(&mut self, ctx: &EventCtx, pre_existed: bool) {
        match self.infos.get_mut(&ctx.rel) {
            Some(record) => {
                record.was_modified = true;
                // The path demonstrably exists inside the tree now,
                // whatever the earlier events said.
                record.was_deleted = false;
                record.was_moved_from_only = false;
            }
            None => {
                let mut record = self.blank_record(ctx);
                record.pre_existed = pre_existed;
                record.was_modified = true;
                self.infos.insert(record);
            }
        }
    }

    fn fold_create(&mut self, ctx: &EventCtx, pre_existed: bool) {
        match self.infos.get_mut(&ctx.rel) {
            Some(record) => {
                // Recreation dominates the recorded history.
                record.was_created = true;
                record.was_deleted = false;
                record.was_modified = false;
                record.was_moved_from_only = false;
                record.was_moved_from_and_to = false;
            }
            None => {
                let mut record = self.blank_record(ctx);
                record.pre_existed = pre_existed;
                record.was_created = true;
                self.infos.insert(record);
            }
        }
    }

    fn fold_moved_to(&mut self, ctx: &EventCtx) -> Result<(), EngineError> {
        let matched = self.infos.find_by_cookie(ctx.cookie, ctx.is_dir);
        match (ctx.is_dir, matched) {
            (true, Some(old_key)) => self.fold_dir_move(ctx, &old_key)?,
            (true, None) => {
                info!(path = %ctx.rel, "directory arrived from outside the tree");
                self.expand_directory(ctx);
                // The arrival may have replaced an existing directory, so the
                // record counts as pre-existing.
                self.fold_create(ctx, true);
            }
            (false, Some(old_key)) => self.fold_file_move(ctx, &old_key),
            (false, None) => {
                debug!(path = %ctx.rel, "file arrived from outside the tree; folding as modify");
                self.fold_modify(ctx, true);
            }
        }
        Ok(())
    }

    fn fold_file_move(&mut self, ctx: &EventCtx, old_key: &str) {
        let Some(mut record) = self.infos.remove(old_key) else {
            return;
        };
        info!(from = %old_key, to = %ctx.rel, "file renamed within the tree");

        record.was_moved_from_and_to = true;
        record.was_deleted = false;
        record.was_moved_from_only = false;
        record.cookie = 0;
        // A chain of renames keeps the first origin: that is the path the
        // server still knows the file by.
        if record.old_rel_path.is_none() {
            record.old_parent = Some(record.parent);
            record.old_name = Some(record.name.clone());
            record.old_rel_path = Some(old_key.to_owned());
        }
        record.parent = ctx.parent;
        record.name = ctx.name.clone();
        record.rel_path = ctx.rel.clone();
        if ctx.kind == FileKind::Symlink {
            record.kind = FileKind::Symlink;
            record.link_target = ctx.link_target.clone();
        }
        record.size = ctx.size;
        self.infos.insert(record);
    }

    fn fold_dir_move(&mut self, ctx: &EventCtx, old_key: &str) -> Result<(), EngineError> {
        let Some(mut record) = self.infos.remove(old_key) else {
            return Ok(());
        };
        info!(from = %old_key, to = %ctx.rel, "directory renamed within the tree");

        let old_parent = record.parent;
        let old_name = record.name.clone();
        let moved_node = if self.watches.contains(old_parent) {
            self.watches.find_child(old_parent, &old_name)
        } else {
            None
        };

        // A same-named subtree at the destination was just replaced.
        if let Some(stale) = self.watches.find_child(ctx.parent, &ctx.name) {
            if moved_node != Some(stale) {
                info!(path = %ctx.rel, "replacing previously watched subtree of the same name");
                self.watches.remove_subtree(stale);
                self.infos.remove_subtree(&ctx.rel);
            }
        }

        record.was_moved_from_and_to = true;
        record.was_deleted = false;
        record.was_moved_from_only = false;
        record.cookie = 0;
        if record.old_rel_path.is_none() {
            record.old_parent = Some(old_parent);
            record.old_name = Some(old_name);
            record.old_rel_path = Some(old_key.to_owned());
        }
        record.parent = ctx.parent;
        record.name = ctx.name.clone();
        record.rel_path = ctx.rel.clone();
        self.infos.insert(record);

        match moved_node {
            Some(node) => self.watches.reparent(node, ctx.parent, &ctx.name)?,
            None => {
                warn!(path = %old_key, "moved directory had no watch subtree to reparent");
            }
        }

        // Re-key every record the moved-from stamped, fixing symlink targets
        // that now resolve somewhere new.
        let old_prefix = format!("{old_key}/");
        for key in self.infos.keys_with_cookie(ctx.cookie) {
            let Some(mut child) = self.infos.remove(&key) else {
                continue;
            };
            child.cookie = 0;
            if let Some(suffix) = key.strip_prefix(&old_prefix) {
                let new_key = format!("{}/{}", ctx.rel, suffix);
                child.rel_path = new_key.clone();
                if child.kind == FileKind::Symlink {
                    let child_abs = rel_to_abs(&self.root_abs, &new_key);
                    match resolve_link_target(&child_abs, &self.root_abs) {
                        Ok(Some(target)) => child.link_target = Some(target),
                        Ok(None) => {
                            warn!(
                                path = %new_key,
                                "symbolic link escapes the replicated root after move; dropping its record"
                            );
                            continue;
                        }
                        Err(e) => {
                            warn!(path = %new_key, error = %e, "could not re-resolve symbolic link after move");
                        }
                    }
                }
            }
            self.infos.insert(child);
        }
        Ok(())
    }

    /// Installs a watch for a directory that just appeared and queues
    /// synthetic events for whatever it already contains.
    ///
    /// A same-named stale subtree (a replaced directory) is destroyed first:
    /// watches, nodes, and records. Failures to watch or scan are warnings;
    /// the directory may have vanished again, and its delete event follows.
    fn expand_directory(&mut self, ctx: &EventCtx) {
        if let Some(stale) = self.watches.find_child(ctx.parent, &ctx.name) {
            info!(path = %ctx.rel, "replacing previously watched subtree of the same name");
            self.watches.remove_subtree(stale);
            self.infos.remove_subtree(&ctx.rel);
        }

        let node = match self.watches.add_directory(ctx.parent, &ctx.name) {
            Ok(node) => node,
            Err(e) => {
                warn!(path = %ctx.rel, error = %e, "directory vanished before it could be watched");
                return;
            }
        };
        let abs = ctx.abs.clone();
        self.queue_directory_content(node, &abs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::Outgoing;
    use protocol::OpTag;
    use std::os::unix::fs::symlink;
    use std::time::Duration;
    use tempfile::TempDir;

    fn monitor_for(dir: &TempDir) -> Monitor {
        Monitor::new(dir.path()).expect("monitor")
    }

    /// Collects queued kernel events after giving the kernel a beat.
    fn drain(monitor: &mut Monitor) {
        assert!(monitor
            .watches
            .wait_readable(Some(Duration::from_secs(5)))
            .expect("poll"));
        monitor.drain_kernel_events().expect("drain");
    }

    fn drain_quiet(monitor: &mut Monitor) {
        if monitor
            .watches
            .wait_readable(Some(Duration::from_millis(200)))
            .expect("poll")
        {
            monitor.drain_kernel_events().expect("drain");
        }
    }

    fn plan(monitor: &mut Monitor) -> Vec<Outgoing> {
        monitor.plan_transmission()
    }

    #[test]
    fn bootstrap_expands_directories_and_records_content() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir_all(dir.path().join("a/deep")).expect("mkdirs");
        std::fs::write(dir.path().join("a/b.txt"), b"hello\n").expect("write");
        std::fs::write(dir.path().join("top.txt"), b"top\n").expect("write");

        let mut monitor = monitor_for(&dir);
        monitor.bootstrap().expect("bootstrap");

        // Watches: root, a, a/deep.
        assert_eq!(monitor.watch_count(), 3);
        assert!(monitor.infos.get("./a").expect("dir record").was_created);
        assert!(monitor
            .infos
            .get("./a/deep")
            .expect("nested dir record")
            .was_created);
        assert!(monitor
            .infos
            .get("./a/b.txt")
            .expect("file record")
            .was_modified);
        assert!(monitor
            .infos
            .get("./top.txt")
            .expect("top file record")
            .was_modified);
        assert!(monitor
            .infos
            .iter()
            .all(|(_, info)| !info.pre_existed));
    }

    #[test]
    fn new_directory_with_a_new_file_costs_two_operations() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut monitor = monitor_for(&dir);
        monitor.bootstrap().expect("bootstrap");

        // The file lands before the new directory's watch exists; the
        // expansion scan picks it up instead of the kernel.
        std::fs::create_dir(dir.path().join("a")).expect("mkdir");
        std::fs::write(dir.path().join("a/b.txt"), b"hello\n").expect("write");
        drain(&mut monitor);
        drain_quiet(&mut monitor);

        let plan = plan(&mut monitor);
        assert_eq!(plan.len(), 2);
        assert_eq!(plan[0].tag, OpTag::Create);
        assert_eq!(plan[0].rel, "./a");
        assert!(plan[0].kind.is_directory());
        assert_eq!(plan[1].tag, OpTag::Modify);
        assert_eq!(plan[1].rel, "./a/b.txt");
    }

    #[test]
    fn create_then_delete_of_a_new_path_is_a_wire_noop() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut monitor = monitor_for(&dir);
        monitor.bootstrap().expect("bootstrap");

        std::fs::create_dir(dir.path().join("gone")).expect("mkdir");
        drain(&mut monitor);
        std::fs::remove_dir(dir.path().join("gone")).expect("rmdir");
        drain(&mut monitor);

        assert!(plan(&mut monitor).is_empty());
        assert_eq!(monitor.watch_count(), 1);
    }

    #[test]
    fn delete_of_a_preexisting_path_survives_to_the_wire() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("f.txt"), b"x").expect("write");
        let mut monitor = monitor_for(&dir);
        monitor.bootstrap().expect("bootstrap");
        monitor.infos.clear(); // as after a completed transmission

        std::fs::remove_file(dir.path().join("f.txt")).expect("rm");
        drain(&mut monitor);

        let plan = plan(&mut monitor);
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].tag, OpTag::Delete);
        assert_eq!(plan[0].rel, "./f.txt");
    }

    #[test]
    fn rename_pair_collapses_to_one_move() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("b.txt"), b"data").expect("write");
        let mut monitor = monitor_for(&dir);
        monitor.bootstrap().expect("bootstrap");
        monitor.infos.clear();

        std::fs::rename(dir.path().join("b.txt"), dir.path().join("c.txt")).expect("mv");
        drain(&mut monitor);

        let record = monitor.infos.get("./c.txt").expect("re-keyed record");
        assert!(record.was_moved_from_and_to);
        assert!(!record.was_moved_from_only);
        assert_eq!(record.old_rel_path.as_deref(), Some("./b.txt"));
        assert_eq!(record.cookie, 0);

        let plan = plan(&mut monitor);
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].tag, OpTag::Move);
        assert_eq!(plan[0].rel, "./c.txt");
        assert_eq!(plan[0].old.as_deref(), Some("./b.txt"));
    }

    #[test]
    fn rename_then_append_emits_move_then_modify() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("b.txt"), b"data").expect("write");
        let mut monitor = monitor_for(&dir);
        monitor.bootstrap().expect("bootstrap");
        monitor.infos.clear();

        std::fs::rename(dir.path().join("b.txt"), dir.path().join("c.txt")).expect("mv");
        let mut file = std::fs::OpenOptions::new()
            .append(true)
            .open(dir.path().join("c.txt"))
            .expect("open");
        use std::io::Write as _;
        file.write_all(b"x").expect("append");
        drop(file);
        drain(&mut monitor);

        let plan = plan(&mut monitor);
        assert_eq!(plan.len(), 2);
        assert_eq!(plan[0].tag, OpTag::FilMove);
        assert_eq!(plan[0].rel, "./c.txt");
        assert_eq!(plan[0].old.as_deref(), Some("./b.txt"));
        assert_eq!(plan[1].tag, OpTag::Modify);
        assert_eq!(plan[1].rel, "./c.txt");
    }

    #[test]
    fn unpaired_moved_from_becomes_a_delete() {
        let outside = tempfile::tempdir().expect("outside");
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("f.txt"), b"x").expect("write");
        let mut monitor = monitor_for(&dir);
        monitor.bootstrap().expect("bootstrap");
        monitor.infos.clear();

        std::fs::rename(dir.path().join("f.txt"), outside.path().join("f.txt")).expect("mv out");
        drain(&mut monitor);

        let plan = plan(&mut monitor);
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].tag, OpTag::MovedFrom);
        assert_eq!(plan[0].rel, "./f.txt");
    }

    #[test]
    fn unpaired_moved_from_of_a_new_file_is_dropped() {
        let outside = tempfile::tempdir().expect("outside");
        let dir = tempfile::tempdir().expect("tempdir");
        let mut monitor = monitor_for(&dir);
        monitor.bootstrap().expect("bootstrap");

        std::fs::write(dir.path().join("f.txt"), b"x").expect("write");
        drain(&mut monitor);
        std::fs::rename(dir.path().join("f.txt"), outside.path().join("f.txt")).expect("mv out");
        drain(&mut monitor);

        assert!(plan(&mut monitor).is_empty());
    }

    #[test]
    fn directory_rename_rekeys_children_and_keeps_watches() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir(dir.path().join("a")).expect("mkdir");
        std::fs::write(dir.path().join("a/inner.txt"), b"x").expect("write");
        let mut monitor = monitor_for(&dir);
        monitor.bootstrap().expect("bootstrap");
        monitor.infos.clear();
        let watches_before = monitor.watch_count();

        // Touch the child so a record exists, then rename the directory in
        // the same quiescence window.
        std::fs::write(dir.path().join("a/inner.txt"), b"xy").expect("modify");
        std::fs::rename(dir.path().join("a"), dir.path().join("a2")).expect("mv dir");
        drain(&mut monitor);

        assert_eq!(monitor.watch_count(), watches_before);
        let moved = monitor.infos.get("./a2").expect("dir record");
        assert!(moved.was_moved_from_and_to);
        assert_eq!(moved.old_rel_path.as_deref(), Some("./a"));
        let child = monitor.infos.get("./a2/inner.txt").expect("child re-keyed");
        assert!(child.was_modified);
        assert_eq!(child.cookie, 0);

        let plan = plan(&mut monitor);
        assert_eq!(plan.len(), 2);
        assert_eq!(plan[0].tag, OpTag::Move);
        assert_eq!(plan[0].rel, "./a2");
        assert_eq!(plan[1].tag, OpTag::Modify);
        assert_eq!(plan[1].rel, "./a2/inner.txt");
    }

    #[test]
    fn directory_delete_cascades_over_nested_records() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir_all(dir.path().join("a/b")).expect("mkdirs");
        std::fs::write(dir.path().join("a/b/c.txt"), b"x").expect("write");
        let mut monitor = monitor_for(&dir);
        monitor.bootstrap().expect("bootstrap");
        monitor.infos.clear();

        std::fs::remove_dir_all(dir.path().join("a")).expect("rm -r");
        drain(&mut monitor);
        // rm -r produces bottom-up deletes; allow a short tail.
        drain_quiet(&mut monitor);

        let plan = plan(&mut monitor);
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].tag, OpTag::Delete);
        assert_eq!(plan[0].rel, "./a");
        assert_eq!(monitor.watch_count(), 1);
    }

    #[test]
    fn directory_moved_in_from_outside_is_expanded_depth_ordered() {
        let outside = tempfile::tempdir().expect("outside");
        std::fs::create_dir_all(outside.path().join("d/sub")).expect("mkdirs");
        std::fs::write(outside.path().join("d/f.txt"), b"f").expect("write");
        std::fs::write(outside.path().join("d/sub/g.txt"), b"g").expect("write");

        let dir = tempfile::tempdir().expect("tempdir");
        let mut monitor = monitor_for(&dir);
        monitor.bootstrap().expect("bootstrap");

        std::fs::rename(outside.path().join("d"), dir.path().join("d")).expect("mv in");
        drain(&mut monitor);

        assert_eq!(monitor.watch_count(), 3);
        let plan = plan(&mut monitor);
        let rels: Vec<&str> = plan.iter().map(|op| op.rel.as_str()).collect();

        let d = rels.iter().position(|&r| r == "./d").expect("d planned");
        let sub = rels.iter().position(|&r| r == "./d/sub").expect("sub planned");
        let f = rels.iter().position(|&r| r == "./d/f.txt").expect("f planned");
        let g = rels
            .iter()
            .position(|&r| r == "./d/sub/g.txt")
            .expect("g planned");
        assert!(d < sub, "parent directory before child directory");
        assert!(sub < f && sub < g, "directories before non-directories");
        assert_eq!(plan[d].tag, OpTag::Create);
    }

    #[test]
    fn escaping_symlink_is_dropped_with_no_record() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut monitor = monitor_for(&dir);
        monitor.bootstrap().expect("bootstrap");

        symlink("/etc", dir.path().join("escape")).expect("symlink");
        drain(&mut monitor);

        assert!(monitor.infos.get("./escape").is_none());
        assert!(plan(&mut monitor).is_empty());
    }

    #[test]
    fn in_tree_symlink_records_its_resolved_target() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("real.txt"), b"content").expect("write");
        let mut monitor = monitor_for(&dir);
        monitor.bootstrap().expect("bootstrap");
        monitor.infos.clear();

        symlink(dir.path().join("real.txt"), dir.path().join("link")).expect("symlink");
        drain(&mut monitor);

        let record = monitor.infos.get("./link").expect("link record");
        assert_eq!(record.kind, FileKind::Symlink);
        assert_eq!(record.link_target.as_deref(), Some("./real.txt"));

        let plan = plan(&mut monitor);
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].tag, OpTag::Create);
        assert_eq!(plan[0].link_target.as_deref(), Some("./real.txt"));
    }

    #[test]
    fn recreation_wipes_the_recorded_delete() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("f.txt"), b"v1").expect("write");
        let mut monitor = monitor_for(&dir);
        monitor.bootstrap().expect("bootstrap");
        monitor.infos.clear();

        std::fs::remove_file(dir.path().join("f.txt")).expect("rm");
        std::fs::write(dir.path().join("f.txt"), b"v2").expect("recreate");
        drain(&mut monitor);

        let record = monitor.infos.get("./f.txt").expect("record");
        assert!(!record.was_deleted);
        assert!(record.was_modified || record.was_created);

        let plan = plan(&mut monitor);
        assert_eq!(plan.len(), 1);
        assert_ne!(plan[0].tag, OpTag::Delete);
    }
}
