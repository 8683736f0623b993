//! Editor view handles.
//!
//! An [`Editor`] is one widget displaying a buffer. Several editors can show
//! the same buffer (split groups); a binding fans buffer updates out to each
//! of them and forwards their cursor into the awareness channel.

use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::lock;
use crate::model::{ListenerId, Listeners, TextEdit, TextModel};

/// Unique identity of an editor view.
pub type EditorId = Uuid;

/// Cursor selection in byte offsets. `anchor == head` is a caret.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Selection {
    pub anchor: usize,
    pub head: usize,
}

impl Selection {
    pub fn caret(pos: usize) -> Self {
        Self { anchor: pos, head: pos }
    }

    pub fn new(anchor: usize, head: usize) -> Self {
        Self { anchor, head }
    }

    pub fn is_caret(&self) -> bool {
        self.anchor == self.head
    }

    /// Carry the selection through an edit.
    pub fn map_through(&self, edit: &TextEdit) -> Self {
        Self {
            anchor: edit.map_position(self.anchor),
            head: edit.map_position(self.head),
        }
    }

    /// Clamp both ends into `text`, backing off to a character boundary.
    fn clamp_to(&self, text: &str) -> Self {
        let clamp = |mut pos: usize| {
            pos = pos.min(text.len());
            while !text.is_char_boundary(pos) {
                pos -= 1;
            }
            pos
        };
        Self {
            anchor: clamp(self.anchor),
            head: clamp(self.head),
        }
    }
}

struct EditorInner {
    id: EditorId,
    selection: Mutex<Selection>,
    /// Buffer version this view last displayed
    synced_version: AtomicU64,
    selection_listeners: Listeners<Selection>,
}

/// Cloneable handle to an editor view. Equality is identity.
#[derive(Clone)]
pub struct Editor {
    inner: Arc<EditorInner>,
}

impl Editor {
    pub fn new() -> Self {
        Self::with_id(Uuid::new_v4())
    }

    pub fn with_id(id: EditorId) -> Self {
        Self {
            inner: Arc::new(EditorInner {
                id,
                selection: Mutex::new(Selection::default()),
                synced_version: AtomicU64::new(0),
                selection_listeners: Listeners::new(),
            }),
        }
    }

    pub fn id(&self) -> EditorId {
        self.inner.id
    }

    pub fn selection(&self) -> Selection {
        *lock(&self.inner.selection)
    }

    /// Move the cursor as the user would; selection listeners are notified.
    pub fn set_selection(&self, selection: Selection) {
        *lock(&self.inner.selection) = selection;
        self.inner.selection_listeners.emit(&selection);
    }

    pub fn synced_version(&self) -> u64 {
        self.inner.synced_version.load(Ordering::Acquire)
    }

    pub fn on_selection_change<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&Selection) + Send + Sync + 'static,
    {
        self.inner.selection_listeners.add(listener)
    }

    pub fn remove_selection_listener(&self, id: ListenerId) -> bool {
        self.inner.selection_listeners.remove(id)
    }

    /// Remap the selection through edits applied to the displayed buffer.
    ///
    /// Silent: remote edits move the cursor but the user did not.
    pub(crate) fn apply_remote_edits(&self, edits: &[TextEdit], version: u64) {
        {
            let mut selection = lock(&self.inner.selection);
            for edit in edits {
                *selection = selection.map_through(edit);
            }
        }
        self.inner.synced_version.store(version, Ordering::Release);
    }

    /// Align the view with the buffer's current state.
    pub(crate) fn sync_to(&self, model: &TextModel) {
        let text = model.value();
        {
            let mut selection = lock(&self.inner.selection);
            *selection = selection.clamp_to(&text);
        }
        self.inner
            .synced_version
            .store(model.version(), Ordering::Release);
    }
}

impl Default for Editor {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Editor {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for Editor {}

impl Hash for Editor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.id.hash(state);
    }
}

impl std::fmt::Debug for Editor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Editor")
            .field("id", &self.inner.id)
            .field("selection", &self.selection())
            .finish()
    }
}
