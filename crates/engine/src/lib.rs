#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! Client core of the replicator. The kernel reports raw directory events;
//! this crate folds them into the smallest causally correct set of logical
//! operations and drives the server with it.
//!
//! The pieces, in the order data flows through them:
//!
//! - [`file_info`]: one aggregation record per touched path. A record
//!   accumulates what happened to the path since the last transmission
//!   (created, deleted, modified, moved out, renamed within the tree), so a
//!   thousand raw events still cost one wire operation.
//! - [`aggregate`]: the folding rules. Rename pairs are matched by kernel
//!   cookie; directories arriving from outside the tree are expanded into
//!   watches plus synthetic events for their existing content; a directory
//!   delete cascades over everything recorded beneath it.
//! - [`schedule`]: once the tree goes quiet, records are drained in causal
//!   order (directories shallow to deep, then everything else) and each
//!   record picks the one operation that subsumes its history.
//! - [`transfer`]: the socket dialogue for each chosen operation, including
//!   the digest probe that lets the server satisfy a modify with a local
//!   copy instead of a transfer.
//! - [`monitor`]: the single-threaded loop tying it together: block on the
//!   event descriptor, drain, let a randomised settle window absorb bursts,
//!   then transmit.
//!
//! # Concurrency
//!
//! There is none. One loop owns the watch set, the record map, and the
//! socket; it suspends only in `poll`, `sleep`, and socket I/O. Per-path
//! aggregation is race-free by construction and operations are emitted in
//! a causally safe order.
//!
//! # Errors
//!
//! [`EngineError`] distinguishes watch-layer, protocol-layer, and local I/O
//! failures. Recoverable anomalies (a file vanishing between event and
//! processing, a symlink pointing out of the tree) are logged as warnings
//! and treated as success so the loop keeps running.

pub mod aggregate;
pub mod file_info;
pub mod monitor;
pub mod schedule;
pub mod transfer;

mod error;

pub use error::EngineError;
pub use monitor::{ClientConfig, Monitor};
