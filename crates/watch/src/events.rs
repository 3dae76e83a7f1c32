use inotify::{EventMask, WatchDescriptor};

/// Raw operation class of one kernel event.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RawKind {
    /// A name appeared in a watched directory.
    Create,
    /// A name disappeared from a watched directory.
    Delete,
    /// A name was moved out of a watched directory.
    MovedFrom,
    /// A name was moved into a watched directory.
    MovedTo,
    /// File content under a watched directory changed.
    Modify,
}

/// One kernel event, still expressed in registry terms.
///
/// The watch descriptor is resolved to a node at processing time, not at
/// drain time: an earlier event in the same batch may have destroyed the
/// watch this one refers to, and a late resolution turns that race into a
/// skippable anomaly instead of a dangling reference.
#[derive(Debug)]
pub struct RawEvent {
    /// Kernel watch that observed the event.
    pub descriptor: WatchDescriptor,
    /// Name of the affected directory entry.
    pub name: String,
    /// Operation class.
    pub kind: RawKind,
    /// Cookie pairing a moved-from with its moved-to, zero when absent.
    pub cookie: u32,
    /// Whether the affected entry is a directory.
    pub is_dir: bool,
}

/// Maps an event mask to its operation class.
///
/// Exactly one of the subscribed operation bits is set per event; masks that
/// carry none of them (for example `IGNORED`) yield `None`.
pub(crate) fn classify(mask: EventMask) -> Option<RawKind> {
    if mask.contains(EventMask::CREATE) {
        Some(RawKind::Create)
    } else if mask.contains(EventMask::DELETE) {
        Some(RawKind::Delete)
    } else if mask.contains(EventMask::MOVED_FROM) {
        Some(RawKind::MovedFrom)
    } else if mask.contains(EventMask::MOVED_TO) {
        Some(RawKind::MovedTo)
    } else if mask.contains(EventMask::MODIFY) {
        Some(RawKind::Modify)
    } else {
        None
    }
}
