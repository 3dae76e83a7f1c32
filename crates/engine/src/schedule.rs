//! Depth-ordered transmission planning.
//!
//! When the tree goes quiet the record map is drained into a sequence of
//! wire operations. Directories go first, shallowest depth first, so the
//! peer always has the containing directory before anything inside it, and
//! a parent's delete lands before a child's, turning the child's into a
//! tolerated no-op. Non-directories follow in any order.
//!
//! Per record, one operation wins by priority:
//! delete > moved-from > move (plus modify when content also changed) >
//! modify > create. A delete or moved-from of a path the server never saw
//! (`pre_existed == false`) is a no-op and is dropped here.

use std::collections::BTreeMap;

use protocol::{FileKind, OpTag};
use tracing::{debug, warn};

use crate::file_info::FileInfo;
use crate::monitor::Monitor;

/// One planned wire operation.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct Outgoing {
    pub tag: OpTag,
    pub kind: FileKind,
    pub rel: String,
    /// Old relative path, move tags only.
    pub old: Option<String>,
    /// Resolved target, symlink creates only.
    pub link_target: Option<String>,
}

impl Monitor {
    /// Drains the record map into a causally ordered operation sequence.
    pub(crate) fn plan_transmission(&mut self) -> Vec<Outgoing> {
        // Directory records bucketed by depth; the map iterates shallow to
        // deep. Depth comes from the parent node when it is still alive and
        // from the path shape otherwise (a deleted directory's record can
        // outlive its watch ancestry).
        let mut dirs_by_depth: BTreeMap<u32, Vec<String>> = BTreeMap::new();
        for (key, info) in self.infos.iter() {
            if info.kind == FileKind::Directory {
                dirs_by_depth
                    .entry(self.record_depth(info))
                    .or_default()
                    .push(key.clone());
            }
        }

        let mut plan = Vec::new();
        for (depth, keys) in dirs_by_depth {
            debug!(depth, directories = keys.len(), "planning directory level");
            for key in keys {
                if let Some(record) = self.infos.remove(&key) {
                    plan_record(record, &mut plan);
                }
            }
        }
        for key in self.infos.keys() {
            if let Some(record) = self.infos.remove(&key) {
                plan_record(record, &mut plan);
            }
        }
        plan
    }

    fn record_depth(&self, info: &FileInfo) -> u32 {
        if self.watches.contains(info.parent) {
            self.watches.depth(info.parent) + 1
        } else {
            info.rel_path.matches('/').count() as u32
        }
    }
}

/// Chooses the operation that subsumes a record's history.
fn plan_record(record: FileInfo, plan: &mut Vec<Outgoing>) {
    let FileInfo {
        kind,
        pre_existed,
        rel_path,
        link_target,
        size,
        was_created,
        was_deleted,
        was_modified,
        was_moved_from_only,
        was_moved_from_and_to,
        old_rel_path,
        ..
    } = record;
    debug!(path = %rel_path, ?kind, size, "planning record");

    if was_deleted {
        if pre_existed {
            plan.push(Outgoing {
                tag: OpTag::Delete,
                kind,
                rel: rel_path,
                old: None,
                link_target: None,
            });
        } else {
            debug!("delete of a never-transmitted path; dropped");
        }
        return;
    }

    if was_moved_from_only {
        if pre_existed {
            plan.push(Outgoing {
                tag: OpTag::MovedFrom,
                kind,
                rel: rel_path,
                old: None,
                link_target: None,
            });
        } else {
            debug!("departure of a never-transmitted path; dropped");
        }
        return;
    }

    if was_moved_from_and_to {
        let Some(old) = old_rel_path else {
            warn!(path = %rel_path, "rename record lost its origin; dropped");
            return;
        };
        if was_modified && kind != FileKind::Directory {
            // The server cannot reconstruct new content from a rename alone.
            plan.push(Outgoing {
                tag: OpTag::FilMove,
                kind,
                rel: rel_path.clone(),
                old: Some(old),
                link_target: None,
            });
            plan.push(Outgoing {
                tag: OpTag::Modify,
                kind,
                rel: rel_path,
                old: None,
                link_target: None,
            });
        } else {
            plan.push(Outgoing {
                tag: OpTag::Move,
                kind,
                rel: rel_path,
                old: Some(old),
                link_target: None,
            });
        }
        return;
    }

    if was_modified {
        plan.push(Outgoing {
            tag: OpTag::Modify,
            kind,
            rel: rel_path,
            old: None,
            link_target: None,
        });
        return;
    }

    if was_created {
        plan.push(Outgoing {
            tag: OpTag::Create,
            kind,
            rel: rel_path,
            old: None,
            link_target: if kind == FileKind::Symlink {
                link_target
            } else {
                None
            },
        });
        return;
    }

    warn!(path = %rel_path, "record carries no actionable history; dropped");
}
