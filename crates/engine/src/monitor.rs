//! The monitoring loop: bootstrap, quiescence detection, transmission.

use std::collections::VecDeque;
use std::fs;
use std::io::{Read, Write};
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use rand::Rng;
use tracing::{debug, error, info, warn};
use watch::WatchSet;

use crate::aggregate::EventInput;
use crate::file_info::FileInfoMap;
use crate::transfer::Sender;
use crate::EngineError;

/// Validated client-side configuration, threaded explicitly through the core.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Server port.
    pub port: u16,
    /// Server IPv4 address.
    pub server: Ipv4Addr,
    /// Main directory to replicate, as given on the command line.
    pub root: PathBuf,
    /// Total monitoring lifetime; `None` runs forever.
    pub duration: Option<Duration>,
    /// Guaranteed settle time after the first drain of a burst, seconds.
    pub settle_min_secs: u64,
    /// Width of the randomised settle window added on every drain, seconds.
    pub settle_window_secs: u64,
}

impl ClientConfig {
    /// Builds a configuration with the default settle timings.
    ///
    /// A `duration_secs` of zero means "run forever", matching the CLI
    /// contract.
    #[must_use]
    pub fn new(port: u16, server: Ipv4Addr, root: PathBuf, duration_secs: u64) -> Self {
        Self {
            port,
            server,
            root,
            duration: (duration_secs != 0).then(|| Duration::from_secs(duration_secs)),
            settle_min_secs: 0,
            settle_window_secs: 5,
        }
    }
}

/// Client-side replication state: watches, aggregation records, event queue.
///
/// Owned by a single thread; every suspension point (poll, settle sleep,
/// socket I/O) happens between whole events, so aggregation never observes a
/// half-applied update.
pub struct Monitor {
    pub(crate) watches: WatchSet,
    pub(crate) infos: FileInfoMap,
    pub(crate) root_abs: PathBuf,
    pub(crate) pending: VecDeque<EventInput>,
    pub(crate) op_seq: u64,
}

impl Monitor {
    /// Creates the watch set for `root` and an empty record map.
    ///
    /// The root is fully resolved first so symlink-escape checks compare
    /// against a canonical prefix.
    pub fn new(root: &Path) -> Result<Self, EngineError> {
        let root_abs = fs::canonicalize(root)?;
        let watches = WatchSet::initialize(&root_abs)?;
        Ok(Self {
            watches,
            infos: FileInfoMap::new(),
            root_abs,
            pending: VecDeque::new(),
            op_seq: 0,
        })
    }

    /// Number of live kernel watches.
    #[must_use]
    pub fn watch_count(&self) -> usize {
        self.watches.watch_count()
    }

    /// Number of aggregation records awaiting transmission.
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.infos.len()
    }

    /// Walks the main directory and seeds synthetic events for its content.
    ///
    /// Directories become create events (which install watches and recurse
    /// through their own content), symlinks become creates carrying their
    /// resolved target, and every other file becomes a modify so the first
    /// transmission pushes content through the digest check.
    pub fn bootstrap(&mut self) -> Result<(), EngineError> {
        info!(root = %self.root_abs.display(), "scanning initial directory state");
        let root = self.watches.root();
        let root_abs = self.root_abs.clone();
        self.queue_directory_content(root, &root_abs);
        self.drain_pending();
        info!(
            watches = self.watch_count(),
            records = self.record_count(),
            "initial state recorded"
        );
        Ok(())
    }

    /// Queues one synthetic event per entry of `dir_abs`, watched by `node`.
    pub(crate) fn queue_directory_content(&mut self, node: watch::NodeId, dir_abs: &Path) {
        let entries = match fs::read_dir(dir_abs) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(path = %dir_abs.display(), error = %e, "directory vanished before scanning");
                return;
            }
        };

        let mut names: Vec<String> = Vec::new();
        for entry in entries {
            let Ok(entry) = entry else { continue };
            match entry.file_name().into_string() {
                Ok(name) => names.push(name),
                Err(name) => warn!(?name, "skipping entry with non-UTF-8 name"),
            }
        }
        names.sort();

        for name in names {
            let abs = dir_abs.join(&name);
            let meta = match fs::symlink_metadata(&abs) {
                Ok(meta) => meta,
                Err(e) => {
                    warn!(path = %abs.display(), error = %e, "entry vanished before scanning");
                    continue;
                }
            };
            let (kind, is_dir) = if meta.is_dir() {
                (watch::RawKind::Create, true)
            } else if meta.file_type().is_symlink() {
                (watch::RawKind::Create, false)
            } else {
                (watch::RawKind::Modify, false)
            };
            self.pending.push_back(EventInput {
                kind,
                node,
                name,
                cookie: 0,
                is_dir,
                existed_hint: Some(false),
            });
        }
    }

    /// Applies queued synthetic events until the queue is dry.
    ///
    /// A failing event aborts that event only: the queue keeps draining so
    /// one bad path cannot stall the stream.
    pub(crate) fn drain_pending(&mut self) {
        while let Some(event) = self.pending.pop_front() {
            if let Err(e) = self.apply_event(event) {
                error!(error = %e, "synthetic event processing failed; continuing");
            }
        }
    }

    /// Drains the kernel buffer and folds every event into the record map.
    ///
    /// Returns the number of raw events consumed. Events whose watch has
    /// disappeared mid-batch are skipped with a warning.
    pub fn drain_kernel_events(&mut self) -> Result<usize, EngineError> {
        let events = self.watches.drain_events()?;
        let consumed = events.len();
        for event in events {
            let Some(node) = self.watches.node_by_descriptor(&event.descriptor) else {
                warn!(name = %event.name, "event for an already-destroyed watch; skipping");
                continue;
            };
            let input = EventInput {
                kind: event.kind,
                node,
                name: event.name,
                cookie: event.cookie,
                is_dir: event.is_dir,
                existed_hint: None,
            };
            if let Err(e) = self.apply_event(input) {
                error!(error = %e, "event processing failed; continuing");
            }
            self.drain_pending();
        }
        Ok(consumed)
    }

    /// Transmits every aggregated record to the peer, then clears the map.
    pub fn sync_once<S: Read + Write>(&mut self, stream: &mut S) -> Result<(), EngineError> {
        if self.infos.is_empty() {
            debug!("no recorded events to transmit");
            return Ok(());
        }
        let plan = self.plan_transmission();
        info!(operations = plan.len(), "transmitting aggregated operations");
        let mut sender = Sender::new(stream, &self.root_abs, &mut self.op_seq);
        for op in &plan {
            sender.send_operation(op)?;
        }
        self.infos.clear();
        info!("all recorded operations sent");
        Ok(())
    }

    /// Runs bootstrap, the initial sweep, and the monitoring loop.
    ///
    /// The loop blocks until the event descriptor turns readable, drains it,
    /// sleeps a randomised settle interval so bursts and rename pairs arrive
    /// whole, re-checks once, and transmits when the tree is quiet. It ends
    /// when the configured lifetime elapses, after one final drain attempt.
    pub fn run<S: Read + Write>(
        &mut self,
        stream: &mut S,
        config: &ClientConfig,
    ) -> Result<(), EngineError> {
        self.bootstrap()?;
        self.sync_once(stream)?;

        let started = Instant::now();
        loop {
            let remaining = match config.duration {
                Some(total) => match total.checked_sub(started.elapsed()) {
                    Some(rem) if !rem.is_zero() => Some(rem),
                    _ => break,
                },
                None => None,
            };

            debug!("waiting for events");
            if !self.watches.wait_readable(remaining)? {
                continue;
            }

            let mut first_settle = true;
            loop {
                let drained = self.drain_kernel_events()?;
                debug!(events = drained, "kernel buffer drained");

                let settle = self.settle_interval(config, first_settle);
                if !settle.is_zero() {
                    debug!(seconds = settle.as_secs(), "settling before transmission");
                    thread::sleep(settle);
                }

                if self.watches.wait_readable(Some(Duration::ZERO))? {
                    first_settle = false;
                    continue;
                }
                self.sync_once(stream)?;
                break;
            }
        }

        // One last look so a bounded run does not abandon settled events.
        self.drain_kernel_events()?;
        self.sync_once(stream)?;
        Ok(())
    }

    /// Settle time before re-checking the queue: the guaranteed minimum on
    /// the first pass of a burst plus a random share of the jitter window.
    fn settle_interval(&self, config: &ClientConfig, first: bool) -> Duration {
        let base = if first { config.settle_min_secs } else { 0 };
        let jitter = if config.settle_window_secs > 0 {
            rand::thread_rng().gen_range(0..config.settle_window_secs)
        } else {
            0
        };
        Duration::from_secs(base + jitter)
    }
}
