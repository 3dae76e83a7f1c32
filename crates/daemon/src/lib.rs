#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! Server side of the replicator. One peer at a time connects and streams
//! logical operations; this crate applies each against the mirror root and
//! keeps a content index so repeated payloads never cross the wire twice.
//!
//! - [`hash_index`]: the digest bookkeeping. By-path entries are the truth;
//!   the digest-to-path side table answers "do I already have this content"
//!   and is allowed to go stale (last writer wins), costing at most one
//!   redundant transfer.
//! - [`applier`]: executes one received operation with direct filesystem
//!   calls (no shelling out) under remove-then-create semantics, so a
//!   replayed or overlapping operation converges instead of failing.
//! - [`server`]: bind, accept, serve until disconnect, accept again. The
//!   index is built fresh from disk at startup and lives across client
//!   sessions; nothing is persisted.
//!
//! # Errors
//!
//! A failed operation aborts that operation only; the session keeps reading.
//! Losing the stream (or any I/O error on it, since framing has no resync
//! points) ends the session and the server returns to `accept`.

pub mod applier;
pub mod cli;
pub mod hash_index;
pub mod server;

mod error;

pub use applier::Applier;
pub use error::DaemonError;
pub use hash_index::{HashIndex, HashInfo};
pub use server::{run, ServerConfig};
