//! Events emitted by store changes.

use crate::meta::ObjectKey;

/// Emitted after every committed write, dispatched on a broadcast channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A record was created or updated (including a deletion request that
    /// is waiting on finalizers).
    Applied { kind: String, key: ObjectKey },
    /// A record was physically removed.
    Deleted { kind: String, key: ObjectKey },
}

impl Event {
    /// Get the record kind for this event.
    pub fn kind(&self) -> &str {
        match self {
            Event::Applied { kind, .. } | Event::Deleted { kind, .. } => kind,
        }
    }

    /// Get the record key for this event.
    pub fn key(&self) -> &ObjectKey {
        match self {
            Event::Applied { key, .. } | Event::Deleted { key, .. } => key,
        }
    }
}
