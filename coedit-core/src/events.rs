//! Events the collaboration service reacts to, and the queue feeding it.
//!
//! Editor lifecycle events come from the host's editor subsystem; shared-map
//! events come from the yrs map observer. Both travel over the same
//! unbounded queue so every transition for a key is strictly ordered.

use tokio::sync::mpsc;

use crate::editor::Editor;
use crate::key::DocumentKey;

/// Lifecycle events produced by the editor-document subsystem.
#[derive(Debug, Clone)]
pub enum EditorEvent {
    DocumentCreated { key: DocumentKey },
    DocumentRemoved { key: DocumentKey },
    GroupOpened { key: DocumentKey, editor: Editor },
    GroupClosed { key: DocumentKey, editor: Editor },
}

impl EditorEvent {
    pub fn key(&self) -> &DocumentKey {
        match self {
            Self::DocumentCreated { key }
            | Self::DocumentRemoved { key }
            | Self::GroupOpened { key, .. }
            | Self::GroupClosed { key, .. } => key,
        }
    }
}

/// What happened to an entry of the shared text map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapAction {
    Added,
    Deleted,
}

/// Everything that flows through the service queue.
#[derive(Debug, Clone)]
pub enum ServiceEvent {
    Editor(EditorEvent),
    SharedMap { key: DocumentKey, action: MapAction },
}

/// Subscription table key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    DocumentCreated,
    DocumentRemoved,
    GroupOpened,
    GroupClosed,
    SharedMapChanged,
}

impl ServiceEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Editor(EditorEvent::DocumentCreated { .. }) => EventKind::DocumentCreated,
            Self::Editor(EditorEvent::DocumentRemoved { .. }) => EventKind::DocumentRemoved,
            Self::Editor(EditorEvent::GroupOpened { .. }) => EventKind::GroupOpened,
            Self::Editor(EditorEvent::GroupClosed { .. }) => EventKind::GroupClosed,
            Self::SharedMap { .. } => EventKind::SharedMapChanged,
        }
    }

    pub fn key(&self) -> &DocumentKey {
        match self {
            Self::Editor(event) => event.key(),
            Self::SharedMap { key, .. } => key,
        }
    }
}

impl From<EditorEvent> for ServiceEvent {
    fn from(event: EditorEvent) -> Self {
        Self::Editor(event)
    }
}

/// Cloneable sending side of the service queue.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: mpsc::UnboundedSender<ServiceEvent>,
}

impl EventBus {
    pub(crate) fn new(tx: mpsc::UnboundedSender<ServiceEvent>) -> Self {
        Self { tx }
    }

    /// Enqueue an event. Returns false once the service is gone.
    pub fn fire(&self, event: impl Into<ServiceEvent>) -> bool {
        self.tx.send(event.into()).is_ok()
    }

    pub fn document_created(&self, key: impl Into<DocumentKey>) -> bool {
        self.fire(EditorEvent::DocumentCreated { key: key.into() })
    }

    pub fn document_removed(&self, key: impl Into<DocumentKey>) -> bool {
        self.fire(EditorEvent::DocumentRemoved { key: key.into() })
    }

    pub fn group_opened(&self, key: impl Into<DocumentKey>, editor: Editor) -> bool {
        self.fire(EditorEvent::GroupOpened { key: key.into(), editor })
    }

    pub fn group_closed(&self, key: impl Into<DocumentKey>, editor: Editor) -> bool {
        self.fire(EditorEvent::GroupClosed { key: key.into(), editor })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_kind_and_key() {
        let editor = Editor::new();
        let event: ServiceEvent = EditorEvent::GroupOpened {
            key: DocumentKey::from("file:///a"),
            editor,
        }
        .into();
        assert_eq!(event.kind(), EventKind::GroupOpened);
        assert_eq!(event.key().as_str(), "file:///a");

        let map = ServiceEvent::SharedMap {
            key: DocumentKey::from("file:///b"),
            action: MapAction::Deleted,
        };
        assert_eq!(map.kind(), EventKind::SharedMapChanged);
    }

    #[test]
    fn test_fire_after_receiver_dropped() {
        let (tx, rx) = mpsc::unbounded_channel();
        let bus = EventBus::new(tx);
        assert!(bus.document_created("file:///a"));
        drop(rx);
        assert!(!bus.document_removed("file:///a"));
    }
}
