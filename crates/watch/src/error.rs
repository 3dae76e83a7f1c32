use std::error::Error;
use std::fmt;
use std::io;
use std::path::PathBuf;

/// Error raised while manipulating watches.
#[derive(Debug)]
pub struct WatchError {
    kind: WatchErrorKind,
}

impl WatchError {
    fn new(kind: WatchErrorKind) -> Self {
        Self { kind }
    }

    pub(crate) fn init(source: io::Error) -> Self {
        Self::new(WatchErrorKind::Init { source })
    }

    pub(crate) fn add_watch(path: PathBuf, source: io::Error) -> Self {
        Self::new(WatchErrorKind::AddWatch { path, source })
    }

    pub(crate) fn events(source: io::Error) -> Self {
        Self::new(WatchErrorKind::Events { source })
    }

    pub(crate) fn poll(source: io::Error) -> Self {
        Self::new(WatchErrorKind::Poll { source })
    }

    pub(crate) fn duplicate_child(path: PathBuf) -> Self {
        Self::new(WatchErrorKind::DuplicateChild { path })
    }

    /// Returns the specific failure.
    #[must_use]
    pub fn kind(&self) -> &WatchErrorKind {
        &self.kind
    }
}

impl fmt::Display for WatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            WatchErrorKind::Init { source } => {
                write!(f, "failed to create the kernel event handle: {source}")
            }
            WatchErrorKind::AddWatch { path, source } => {
                write!(f, "failed to watch '{}': {}", path.display(), source)
            }
            WatchErrorKind::Events { source } => {
                write!(f, "failed to read kernel events: {source}")
            }
            WatchErrorKind::Poll { source } => {
                write!(f, "failed to wait for kernel events: {source}")
            }
            WatchErrorKind::DuplicateChild { path } => {
                write!(
                    f,
                    "a watch for '{}' already exists under its parent",
                    path.display()
                )
            }
        }
    }
}

impl Error for WatchError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self.kind {
            WatchErrorKind::Init { source }
            | WatchErrorKind::AddWatch { source, .. }
            | WatchErrorKind::Events { source }
            | WatchErrorKind::Poll { source } => Some(source),
            WatchErrorKind::DuplicateChild { .. } => None,
        }
    }
}

/// Classification of watch failures.
#[derive(Debug)]
pub enum WatchErrorKind {
    /// The inotify handle could not be created.
    Init {
        /// Underlying error emitted by the operating system.
        source: io::Error,
    },
    /// A kernel watch could not be acquired for a directory.
    AddWatch {
        /// Directory that could not be watched.
        path: PathBuf,
        /// Underlying error emitted by the operating system.
        source: io::Error,
    },
    /// Draining the kernel event buffer failed.
    Events {
        /// Underlying error emitted by the operating system.
        source: io::Error,
    },
    /// Polling the event descriptor for readiness failed.
    Poll {
        /// Underlying error emitted by the operating system.
        source: io::Error,
    },
    /// A same-named sibling already exists; the caller must evict it first.
    DuplicateChild {
        /// Path of the conflicting child.
        path: PathBuf,
    },
}
