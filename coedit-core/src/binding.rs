//! Two-way binding between one replicated text and one local buffer.
//!
//! ```text
//!            local edit                          remote update
//!                │                                     │
//!                ▼                                     ▼
//!   doc write lock (ReplicaLink)          doc write lock (commit)
//!                │                                     │
//!                ▼                                     ▼
//!   buffer edit ──► TextRef            TextRef::observe ──► buffer edit
//!                                      skip own origin        └──► editors
//! ```
//!
//! Both directions change the buffer while the document's write lock is
//! held, so the buffer and the text never see each other's edits out of
//! order. The binding owns neither the buffer nor the text, only the
//! subscriptions connecting them and the set of attached editors.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use yrs::branch::Branch;
use yrs::types::Delta;
use yrs::{
    Any, Doc, GetString, Observable, Origin, Out, Subscription, Text, TextRef, Transact,
    TransactionMut, UndoManager,
};

use crate::awareness::{Awareness, RemoteCursor};
use crate::editor::{Editor, EditorId};
use crate::error::{CollabError, Result};
use crate::key::DocumentKey;
use crate::lock;
use crate::model::{EditOrigin, ListenerId, ReplicaSink, ReplicaWrite, TextEdit, TextModel};

static NEXT_BINDING_ID: AtomicU64 = AtomicU64::new(1);

/// State reachable from the yrs and buffer callbacks.
struct BindingShared {
    key: DocumentKey,
    doc: Doc,
    model: Arc<TextModel>,
    awareness: Arc<Awareness>,
    /// Tags every transaction this binding makes
    origin: Origin,
    text: Mutex<TextRef>,
    editors: Mutex<Vec<Editor>>,
    halted: AtomicBool,
}

impl BindingShared {
    fn halt(&self, err: &CollabError) {
        if !self.halted.swap(true, Ordering::AcqRel) {
            log::warn!("Synchronization halted for {}: {err}", self.key);
        }
    }

    fn is_halted(&self) -> bool {
        self.halted.load(Ordering::Acquire)
    }

    /// Replicated → buffer, remapping every attached editor.
    fn apply_replicated(&self, edits: &[TextEdit]) -> Result<()> {
        if edits.is_empty() {
            return Ok(());
        }
        let version = self.model.apply_edits(edits, EditOrigin::Replicated)?;
        for editor in lock(&self.editors).iter() {
            editor.apply_remote_edits(edits, version);
        }
        Ok(())
    }
}

/// Buffer → replicated. Attached to the buffer for the binding's lifetime.
struct ReplicaLink {
    doc: Doc,
    shared: Weak<BindingShared>,
}

impl ReplicaSink for ReplicaLink {
    fn begin(&self) -> Option<Box<dyn ReplicaWrite + '_>> {
        let shared = self.shared.upgrade()?;
        if shared.is_halted() {
            return None;
        }
        let txn = self.doc.transact_mut_with(shared.origin.clone());
        Some(Box::new(LinkWrite { shared, txn }))
    }
}

struct LinkWrite<'doc> {
    shared: Arc<BindingShared>,
    txn: TransactionMut<'doc>,
}

impl ReplicaWrite for LinkWrite<'_> {
    fn write(&mut self, edits: &[TextEdit]) {
        let text = lock(&self.shared.text).clone();
        if let Err(err) = write_edits(&text, &mut self.txn, edits) {
            self.shared.halt(&err);
        }
    }
}

/// Apply buffer edits to a replicated text inside an open transaction.
fn write_edits(text: &TextRef, txn: &mut TransactionMut, edits: &[TextEdit]) -> Result<()> {
    for edit in edits {
        let len = text.len(txn) as usize;
        if edit.offset + edit.delete > len {
            return Err(CollabError::EditOutOfBounds {
                offset: edit.offset,
                delete: edit.delete,
                len,
            });
        }
        if edit.delete > 0 {
            text.remove_range(txn, edit.offset as u32, edit.delete as u32);
        }
        if !edit.insert.is_empty() {
            text.insert(txn, edit.offset as u32, &edit.insert);
        }
    }
    Ok(())
}

/// Translate a yrs text delta into sequential buffer edits.
///
/// Buffers hold plain text only; an embedded value is an error.
fn edits_from_delta(delta: &[Delta]) -> Result<Vec<TextEdit>> {
    let mut edits: Vec<TextEdit> = Vec::new();
    let mut index = 0usize;
    for change in delta {
        match change {
            Delta::Retain(len, _) => index += *len as usize,
            Delta::Deleted(len) => edits.push(TextEdit::delete(index, *len as usize)),
            Delta::Inserted(Out::Any(Any::String(chunk)), _) => {
                match edits.last_mut() {
                    // delete + insert at the same spot is one replacement
                    Some(last) if last.offset == index && last.insert.is_empty() => {
                        last.insert.push_str(chunk);
                    }
                    _ => edits.push(TextEdit::insert(index, chunk.to_string())),
                }
                index += chunk.len();
            }
            Delta::Inserted(_, _) => return Err(CollabError::EmbeddedValue(index)),
        }
    }
    Ok(edits)
}

fn same_text(a: &TextRef, b: &TextRef) -> bool {
    let a: &Branch = a.as_ref();
    let b: &Branch = b.as_ref();
    std::ptr::eq(a, b)
}

/// Replicated → buffer for `text`. Runs inside the committing transaction.
fn observe_text(shared: &Arc<BindingShared>, text: &TextRef) -> Subscription {
    let weak = Arc::downgrade(shared);
    let origin = shared.origin.clone();
    text.observe(move |txn, event| {
        if txn.origin() == Some(&origin) {
            return;
        }
        let Some(shared) = weak.upgrade() else {
            return;
        };
        if shared.is_halted() {
            return;
        }
        let applied = edits_from_delta(event.delta(txn))
            .and_then(|edits| shared.apply_replicated(&edits));
        if let Err(err) = applied {
            shared.halt(&err);
        }
    })
}

/// Live synchronization unit for one document key.
pub struct Binding {
    shared: Arc<BindingShared>,
    text_subscription: Option<Subscription>,
    undo_manager: Option<UndoManager>,
    selection_listeners: HashMap<EditorId, ListenerId>,
    disposed: bool,
}

impl Binding {
    /// Bind `model` to `text`, which must already live in the shared map.
    ///
    /// The buffer takes the replicated content first; that change is
    /// applied as a replicated edit and is not echoed back.
    pub fn new(
        key: DocumentKey,
        doc: Doc,
        text: TextRef,
        model: Arc<TextModel>,
        awareness: Arc<Awareness>,
    ) -> Result<Self> {
        let id = NEXT_BINDING_ID.fetch_add(1, Ordering::Relaxed);
        let origin = Origin::from(format!("coedit-binding-{id}").as_str());

        let mut undo_manager = UndoManager::new(&doc, &text);
        undo_manager.include_origin(origin.clone());

        let shared = Arc::new(BindingShared {
            key,
            doc,
            model,
            awareness,
            origin,
            text: Mutex::new(text.clone()),
            editors: Mutex::new(Vec::new()),
            halted: AtomicBool::new(false),
        });

        // Writers stay out until the buffer matches the text and both
        // directions are live.
        let subscription = {
            let txn = shared.doc.transact();
            let subscription = observe_text(&shared, &text);
            shared.model.attach_replica(Arc::new(ReplicaLink {
                doc: shared.doc.clone(),
                shared: Arc::downgrade(&shared),
            }));
            let content = text.get_string(&txn);
            if let Err(err) = shared.model.set_value(&content, EditOrigin::Replicated) {
                shared.model.detach_replica();
                return Err(err);
            }
            subscription
        };

        log::debug!("Binding created for {}", shared.key);
        Ok(Self {
            shared,
            text_subscription: Some(subscription),
            undo_manager: Some(undo_manager),
            selection_listeners: HashMap::new(),
            disposed: false,
        })
    }

    pub fn key(&self) -> &DocumentKey {
        &self.shared.key
    }

    pub fn text(&self) -> TextRef {
        lock(&self.shared.text).clone()
    }

    pub fn model(&self) -> &Arc<TextModel> {
        &self.shared.model
    }

    /// Attach a view. Its cursor is clamped to the buffer and published.
    pub fn add_editor(&mut self, editor: Editor) {
        if self.disposed {
            log::warn!("add_editor on disposed binding for {}", self.shared.key);
            return;
        }
        {
            let mut editors = lock(&self.shared.editors);
            if editors.contains(&editor) {
                return;
            }
            editors.push(editor.clone());
        }
        editor.sync_to(&self.shared.model);

        let weak = Arc::downgrade(&self.shared);
        let listener = editor.on_selection_change(move |selection| {
            if let Some(shared) = weak.upgrade() {
                shared.awareness.set_local_cursor(&shared.key, *selection);
            }
        });
        self.selection_listeners.insert(editor.id(), listener);
        self.shared
            .awareness
            .set_local_cursor(&self.shared.key, editor.selection());
    }

    /// Detach a view. The binding keeps synchronizing the buffer even when
    /// no editor is left.
    pub fn remove_editor(&mut self, editor: &Editor) -> bool {
        let (removed, now_empty) = {
            let mut editors = lock(&self.shared.editors);
            let before = editors.len();
            editors.retain(|e| e != editor);
            (editors.len() != before, editors.is_empty())
        };
        if let Some(listener) = self.selection_listeners.remove(&editor.id()) {
            editor.remove_selection_listener(listener);
        }
        if removed && now_empty {
            self.shared.awareness.clear_local_cursor(&self.shared.key);
        }
        removed
    }

    pub fn editors(&self) -> Vec<Editor> {
        lock(&self.shared.editors).clone()
    }

    pub fn editor_count(&self) -> usize {
        lock(&self.shared.editors).len()
    }

    pub fn has_editor(&self, editor: &Editor) -> bool {
        lock(&self.shared.editors).contains(editor)
    }

    /// Re-target the binding to another replicated text for the same buffer.
    ///
    /// The buffer keeps its content; the new text is brought in line with
    /// it and becomes the synchronization target from here on. Undo history
    /// starts over.
    pub fn change_text(&mut self, text: TextRef) {
        if self.disposed {
            return;
        }
        if same_text(&lock(&self.shared.text), &text) {
            return;
        }
        self.text_subscription = None;

        let shared = self.shared.clone();
        let (subscription, aligned) = {
            let mut txn = shared.doc.transact_mut_with(shared.origin.clone());
            *lock(&shared.text) = text.clone();
            let subscription = observe_text(&shared, &text);
            let buffer = shared.model.value();
            let current = text.get_string(&txn);
            let aligned = match TextEdit::between(&current, &buffer) {
                Some(edit) => write_edits(&text, &mut txn, &[edit]),
                None => Ok(()),
            };
            (subscription, aligned)
        };
        self.text_subscription = Some(subscription);
        match aligned {
            Ok(()) => self.shared.halted.store(false, Ordering::Release),
            Err(err) => self.shared.halt(&err),
        }

        if let Some(manager) = self.undo_manager.as_mut() {
            manager.expand_scope(&text);
            manager.clear();
        }
        log::debug!("Binding for {} re-targeted to a new replicated text", self.shared.key);
    }

    /// Undo this binding's own last change. Other peers' edits are kept.
    pub fn undo(&mut self) -> bool {
        if self.disposed || self.shared.is_halted() {
            return false;
        }
        self.undo_manager
            .as_mut()
            .is_some_and(|manager| manager.undo_blocking())
    }

    pub fn redo(&mut self) -> bool {
        if self.disposed || self.shared.is_halted() {
            return false;
        }
        self.undo_manager
            .as_mut()
            .is_some_and(|manager| manager.redo_blocking())
    }

    /// Cursors of other collaborators in this document.
    pub fn remote_cursors(&self) -> Vec<RemoteCursor> {
        self.shared.awareness.remote_cursors(&self.shared.key)
    }

    pub fn is_halted(&self) -> bool {
        self.shared.is_halted()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Release both subscriptions and every editor. Idempotent.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.shared.model.detach_replica();
        self.text_subscription = None;
        self.undo_manager = None;
        let editors = std::mem::take(&mut *lock(&self.shared.editors));
        for editor in editors {
            if let Some(listener) = self.selection_listeners.remove(&editor.id()) {
                editor.remove_selection_listener(listener);
            }
        }
        self.shared.awareness.clear_local_cursor(&self.shared.key);
        log::debug!("Binding disposed for {}", self.shared.key);
    }
}

impl Drop for Binding {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for Binding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Binding")
            .field("key", &self.shared.key)
            .field("editors", &self.editor_count())
            .field("halted", &self.is_halted())
            .field("disposed", &self.disposed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::SHARED_TEXTS;
    use crate::editor::Selection;
    use std::sync::atomic::AtomicUsize;
    use yrs::{Map, TextPrelim};

    const KEY: &str = "file:///src/main.rs";

    struct Fixture {
        doc: Doc,
        text: TextRef,
        model: Arc<TextModel>,
        awareness: Arc<Awareness>,
    }

    fn fixture(replicated: &str, buffer: &str) -> Fixture {
        let doc = Doc::new();
        let texts = doc.get_or_insert_map(SHARED_TEXTS);
        let text = {
            let mut txn = doc.transact_mut();
            texts.insert(&mut txn, KEY, TextPrelim::new(replicated))
        };
        Fixture {
            awareness: Arc::new(Awareness::with_interval(doc.client_id(), "tester", std::time::Duration::ZERO)),
            doc,
            text,
            model: Arc::new(TextModel::new(DocumentKey::from(KEY), buffer)),
        }
    }

    fn bind(f: &Fixture) -> Binding {
        Binding::new(
            DocumentKey::from(KEY),
            f.doc.clone(),
            f.text.clone(),
            f.model.clone(),
            f.awareness.clone(),
        )
        .unwrap()
    }

    fn text_of(doc: &Doc, text: &TextRef) -> String {
        text.get_string(&doc.transact())
    }

    fn remote_insert(f: &Fixture, index: u32, chunk: &str) {
        let mut txn = f.doc.transact_mut_with("peer");
        f.text.insert(&mut txn, index, chunk);
    }

    #[test]
    fn test_buffer_takes_replicated_content() {
        let f = fixture("init content", "");
        let origins = Arc::new(Mutex::new(Vec::new()));
        let sink = origins.clone();
        f.model.on_did_change(move |c| sink.lock().unwrap().push(c.origin));

        let _binding = bind(&f);
        assert_eq!(f.model.value(), "init content");
        assert_eq!(*origins.lock().unwrap(), vec![EditOrigin::Replicated]);
        assert_eq!(text_of(&f.doc, &f.text), "init content");
    }

    #[test]
    fn test_local_edit_reaches_text_without_echo() {
        let f = fixture("hello", "hello");
        let _binding = bind(&f);
        let changes = Arc::new(AtomicUsize::new(0));
        let c = changes.clone();
        f.model.on_did_change(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        f.model.insert(5, " world").unwrap();

        assert_eq!(text_of(&f.doc, &f.text), "hello world");
        assert_eq!(f.model.value(), "hello world");
        assert_eq!(changes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_remote_edit_reaches_buffer_and_remaps_cursors() {
        let f = fixture("world", "world");
        let mut binding = bind(&f);
        let editor = Editor::new();
        editor.set_selection(Selection::caret(3));
        binding.add_editor(editor.clone());

        remote_insert(&f, 0, "hello ");

        assert_eq!(f.model.value(), "hello world");
        assert_eq!(editor.selection(), Selection::caret(9));
        assert_eq!(editor.synced_version(), f.model.version());
    }

    #[test]
    fn test_remote_replacement_is_one_edit() {
        let f = fixture("abc", "abc");
        let _binding = bind(&f);
        let batches = Arc::new(Mutex::new(Vec::new()));
        let sink = batches.clone();
        f.model.on_did_change(move |c| sink.lock().unwrap().push(c.edits.clone()));

        {
            let mut txn = f.doc.transact_mut_with("peer");
            f.text.remove_range(&mut txn, 1, 1);
            f.text.insert(&mut txn, 1, "XY");
        }

        assert_eq!(f.model.value(), "aXYc");
        assert_eq!(*batches.lock().unwrap(), vec![vec![TextEdit::replace(1, 1, "XY")]]);
    }

    #[test]
    fn test_add_editor_is_idempotent() {
        let f = fixture("", "");
        let mut binding = bind(&f);
        let editor = Editor::new();
        binding.add_editor(editor.clone());
        binding.add_editor(editor.clone());
        assert_eq!(binding.editor_count(), 1);
        assert!(binding.has_editor(&editor));
    }

    #[test]
    fn test_remove_last_editor_keeps_syncing() {
        let f = fixture("", "");
        let mut binding = bind(&f);
        let editor = Editor::new();
        binding.add_editor(editor.clone());
        assert!(binding.remove_editor(&editor));
        assert!(!binding.remove_editor(&editor));
        assert_eq!(binding.editor_count(), 0);

        f.model.insert(0, "still synced").unwrap();
        assert_eq!(text_of(&f.doc, &f.text), "still synced");
        remote_insert(&f, 0, ">> ");
        assert_eq!(f.model.value(), ">> still synced");
    }

    #[test]
    fn test_editor_cursor_goes_to_awareness() {
        let f = fixture("some text", "some text");
        let mut binding = bind(&f);
        let editor = Editor::new();
        editor.set_selection(Selection::new(0, 4));
        binding.add_editor(editor.clone());
        let key = DocumentKey::from(KEY);
        assert_eq!(f.awareness.local_cursor(&key), Some(Selection::new(0, 4)));

        editor.set_selection(Selection::caret(9));
        assert_eq!(f.awareness.local_cursor(&key), Some(Selection::caret(9)));

        binding.remove_editor(&editor);
        assert_eq!(f.awareness.local_cursor(&key), None);
        editor.set_selection(Selection::caret(1));
        assert_eq!(f.awareness.local_cursor(&key), None);
    }

    #[test]
    fn test_change_text_keeps_buffer() {
        let f = fixture("hello", "hello");
        let mut binding = bind(&f);
        f.model.insert(5, " world").unwrap();

        let replacement = {
            let texts = f.doc.get_or_insert_map(SHARED_TEXTS);
            let mut txn = f.doc.transact_mut();
            texts.insert(&mut txn, "file:///elsewhere", TextPrelim::new("stale stub"))
        };
        binding.change_text(replacement.clone());

        assert_eq!(f.model.value(), "hello world");
        assert_eq!(text_of(&f.doc, &replacement), "hello world");

        f.model.insert(0, "> ").unwrap();
        assert_eq!(text_of(&f.doc, &replacement), "> hello world");
        // The old text is no longer a target
        assert_eq!(text_of(&f.doc, &f.text), "hello world");
    }

    #[test]
    fn test_change_text_to_same_text_is_noop() {
        let f = fixture("abc", "abc");
        let mut binding = bind(&f);
        binding.change_text(f.text.clone());
        f.model.insert(3, "d").unwrap();
        assert_eq!(text_of(&f.doc, &f.text), "abcd");
    }

    #[test]
    fn test_undo_only_reverts_own_edits() {
        let f = fixture("", "");
        let mut binding = bind(&f);

        f.model.insert(0, "hello").unwrap();
        remote_insert(&f, 5, " world");
        assert_eq!(f.model.value(), "hello world");

        assert!(binding.undo());
        assert_eq!(f.model.value(), " world");
        assert_eq!(text_of(&f.doc, &f.text), " world");

        assert!(binding.redo());
        assert_eq!(f.model.value(), "hello world");
    }

    #[test]
    fn test_undo_with_nothing_to_undo() {
        let f = fixture("text", "text");
        let mut binding = bind(&f);
        assert!(!binding.undo());
        assert!(!binding.redo());
    }

    #[test]
    fn test_dispose_is_idempotent_and_stops_sync() {
        let f = fixture("abc", "abc");
        let mut binding = bind(&f);
        let editor = Editor::new();
        binding.add_editor(editor.clone());
        assert!(f.model.has_replica());

        binding.dispose();
        binding.dispose();
        assert!(binding.is_disposed());
        assert_eq!(binding.editor_count(), 0);
        assert!(!f.model.has_replica());

        f.model.insert(3, "d").unwrap();
        assert_eq!(text_of(&f.doc, &f.text), "abc");
        remote_insert(&f, 0, "z");
        assert_eq!(f.model.value(), "abcd");
        assert!(!binding.undo());
    }

    #[test]
    fn test_unavailable_buffer_halts_only_that_binding() {
        let f = fixture("one", "one");
        let g = {
            let texts = f.doc.get_or_insert_map(SHARED_TEXTS);
            let mut txn = f.doc.transact_mut();
            texts.insert(&mut txn, "file:///two", TextPrelim::new("two"))
        };
        let other_model = Arc::new(TextModel::new(DocumentKey::from("file:///two"), "two"));
        let first = bind(&f);
        let second = Binding::new(
            DocumentKey::from("file:///two"),
            f.doc.clone(),
            g.clone(),
            other_model.clone(),
            f.awareness.clone(),
        )
        .unwrap();

        f.model.dispose();
        remote_insert(&f, 0, "x");
        assert!(first.is_halted());

        {
            let mut txn = f.doc.transact_mut_with("peer");
            g.insert(&mut txn, 3, "!");
        }
        assert!(!second.is_halted());
        assert_eq!(other_model.value(), "two!");
    }

    #[test]
    fn test_edits_from_delta() {
        let delta = vec![
            Delta::Retain(2, None),
            Delta::Deleted(3),
            Delta::Inserted(Out::Any(Any::String("xy".into())), None),
            Delta::Retain(1, None),
            Delta::Inserted(Out::Any(Any::String("z".into())), None),
        ];
        assert_eq!(
            edits_from_delta(&delta).unwrap(),
            vec![TextEdit::replace(2, 3, "xy"), TextEdit::insert(5, "z")]
        );
    }

    #[test]
    fn test_embedded_value_halts_binding() {
        let delta = vec![
            Delta::Retain(1, None),
            Delta::Inserted(Out::Any(Any::Number(7.0)), None),
        ];
        assert!(matches!(
            edits_from_delta(&delta),
            Err(CollabError::EmbeddedValue(1))
        ));

        let f = fixture("ab", "ab");
        let binding = bind(&f);
        {
            let mut txn = f.doc.transact_mut_with("peer");
            f.text.insert_embed(&mut txn, 1, Any::Number(7.0));
            f.text.insert(&mut txn, 2, "c");
        }
        assert!(binding.is_halted());
        assert_eq!(f.model.value(), "ab");
    }

    #[test]
    fn test_concurrent_local_and_remote_edits_converge() {
        for _ in 0..20 {
            let f = fixture("", "");
            let binding = bind(&f);

            let local = {
                let model = f.model.clone();
                std::thread::spawn(move || {
                    for _ in 0..200 {
                        model.insert(0, "L").unwrap();
                    }
                })
            };
            let remote = {
                let doc = f.doc.clone();
                let text = f.text.clone();
                std::thread::spawn(move || {
                    for _ in 0..200 {
                        let mut txn = doc.transact_mut_with("peer");
                        let end = text.len(&txn);
                        text.insert(&mut txn, end, "R");
                    }
                })
            };
            local.join().unwrap();
            remote.join().unwrap();

            assert!(!binding.is_halted());
            let replicated = text_of(&f.doc, &f.text);
            assert_eq!(f.model.value(), replicated);
            assert_eq!(replicated.matches('L').count(), 200);
            assert_eq!(replicated.matches('R').count(), 200);
        }
    }

    #[test]
    fn test_change_text_under_concurrent_local_edits() {
        let f = fixture("base", "base");
        let mut binding = bind(&f);
        let replacement = {
            let texts = f.doc.get_or_insert_map(SHARED_TEXTS);
            let mut txn = f.doc.transact_mut();
            texts.insert(&mut txn, "file:///replacement", TextPrelim::new("stub"))
        };

        let typist = {
            let model = f.model.clone();
            std::thread::spawn(move || {
                for _ in 0..200 {
                    model.insert(0, "x").unwrap();
                }
            })
        };
        binding.change_text(replacement.clone());
        typist.join().unwrap();

        assert!(!binding.is_halted());
        assert_eq!(f.model.value(), text_of(&f.doc, &replacement));
        assert_eq!(f.model.value().matches('x').count(), 200);
    }
}
