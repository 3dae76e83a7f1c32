#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! Kernel-watch bookkeeping for the replicator client. A [`WatchSet`] owns
//! three tightly coupled pieces of state behind one API:
//!
//! - the **inotify handle** with one kernel watch per live directory,
//! - the **registry**: a growable table mapping each watch to its absolute
//!   and `./`-anchored relative path,
//! - the **watch tree** mirroring the directory hierarchy, so a directory
//!   rename is a pointer splice plus one breadth-first path rewrite over the
//!   renamed subtree instead of a string rewrite over the whole table.
//!
//! # Design
//!
//! Tree nodes live in a slot arena and refer to each other by [`NodeId`].
//! Parent links are plain ids, so the parent/child/registry reference cycle
//! of the domain never turns into an ownership cycle. Registry removal is
//! swap-remove; the one displaced entry has its cross-links patched on the
//! spot, which is why no caller ever holds a raw registry index: node ids
//! are the stable handle.
//!
//! # Invariants
//!
//! - Every live node has exactly one registry entry and vice versa.
//! - `depth(child) == depth(parent) + 1`, root depth 0.
//! - A node's registry entry's relative path equals the `/`-joined names on
//!   the path from the root to the node, anchored with `./` (the root itself
//!   is `.`).
//! - "Add watch ⇔ new registry entry" and "remove registry entry ⇒ remove
//!   kernel watch": the kernel watch table and the registry never drift.

mod error;
mod events;
mod set;
mod tree;

pub use error::{WatchError, WatchErrorKind};
pub use events::{RawEvent, RawKind};
pub use set::WatchSet;
pub use tree::NodeId;

pub use inotify::WatchDescriptor;
